use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::schema::{Appointment, Payment, RecurrenceRef, RecurrenceRule};
use crate::utils::add_months_clamped;

fn occurrence_date(first: NaiveDate, rule: RecurrenceRule, index: u32) -> NaiveDate {
    match rule {
        RecurrenceRule::Weekly => first + Days::new(7 * u64::from(index)),
        RecurrenceRule::Biweekly => first + Days::new(14 * u64::from(index)),
        RecurrenceRule::Monthly => add_months_clamped(first, index as i32),
    }
}

/// Expands a template appointment into a batch of `count` occurrences, the
/// first on the template's own date. Monthly occurrences keep the day of
/// month, clamped to shorter months.
pub fn expand_recurring_appointments(
    template: &Appointment,
    series_id: &str,
    rule: RecurrenceRule,
    count: u32,
) -> Vec<Appointment> {
    (0..count)
        .map(|index| {
            let mut occurrence = template.clone();
            occurrence.id = format!("{}-{}", series_id, index);
            occurrence.date = occurrence_date(template.date, rule, index);
            occurrence.series = Some(RecurrenceRef {
                series_id: series_id.to_string(),
                index,
                rule,
            });
            occurrence
        })
        .collect()
}

/// Deletion scopes for appointments that belong to a recurring series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum SeriesDeletion {
    /// Remove one occurrence and leave the rest of the series alone.
    Single { appointment_id: String },
    /// Remove every occurrence of the series on or after a date.
    FromDate { series_id: String, from: NaiveDate },
    /// Remove the whole series.
    WholeSeries { series_id: String },
}

fn in_series(appointment: &Appointment, series_id: &str) -> bool {
    appointment
        .series
        .as_ref()
        .is_some_and(|series| series.series_id == series_id)
}

/// Applies a deletion scope in place and returns how many appointments were
/// removed.
pub fn retain_after_deletion(
    appointments: &mut Vec<Appointment>,
    deletion: &SeriesDeletion,
) -> usize {
    let before = appointments.len();
    match deletion {
        SeriesDeletion::Single { appointment_id } => {
            appointments.retain(|a| a.id != *appointment_id);
        }
        SeriesDeletion::FromDate { series_id, from } => {
            appointments.retain(|a| !(in_series(a, series_id) && a.date >= *from));
        }
        SeriesDeletion::WholeSeries { series_id } => {
            appointments.retain(|a| !in_series(a, series_id));
        }
    }
    before - appointments.len()
}

/// Recording a payment against an appointment marks that appointment paid.
/// Returns whether a linked appointment was found. Payments without a link
/// leave the collection untouched.
pub fn apply_payment(appointments: &mut [Appointment], payment: &Payment) -> bool {
    let Some(target) = payment.appointment_id.as_deref() else {
        return false;
    };
    match appointments.iter_mut().find(|a| a.id == target) {
        Some(appointment) => {
            appointment.is_paid = true;
            true
        }
        None => false,
    }
}
