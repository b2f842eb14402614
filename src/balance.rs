use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::schema::{Appointment, Payment};

/// Grace after the scheduled start before an unpaid session counts as
/// overdue.
pub const OVERDUE_GRACE_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct PatientBalance {
    /// Sum of prices over unpaid past sessions that still bill the patient.
    pub debt: f64,
    /// Sum of every recorded payment, with no date filter.
    pub total_paid: f64,
    /// Most recent session start strictly before now, if any.
    pub last_visit: Option<NaiveDateTime>,
}

/// An appointment generates debt when it is unpaid, dated strictly before
/// today, and not a no-charge cancellation.
pub fn generates_debt(appointment: &Appointment, today: NaiveDate) -> bool {
    !appointment.is_paid && appointment.date < today && !appointment.is_no_charge_cancellation()
}

/// Pure reduction of one patient's appointment and payment history into a
/// balance. Missing prices contribute 0; empty inputs yield the zero
/// balance.
pub fn compute_balance(
    appointments: &[Appointment],
    payments: &[Payment],
    now: NaiveDateTime,
) -> PatientBalance {
    let today = now.date();

    let debt = appointments
        .iter()
        .filter(|a| generates_debt(a, today))
        .map(|a| a.price.unwrap_or(0.0))
        .sum();

    let total_paid = payments.iter().map(|p| p.amount).sum();

    let last_visit = appointments
        .iter()
        .map(Appointment::start_instant)
        .filter(|instant| *instant < now)
        .max();

    PatientBalance {
        debt,
        total_paid,
        last_visit,
    }
}

/// Unpaid, still billable, and the scheduled start plus the grace period has
/// elapsed.
pub fn is_overdue(appointment: &Appointment, now: NaiveDateTime) -> bool {
    !appointment.is_paid
        && !appointment.is_no_charge_cancellation()
        && appointment.start_instant() + Duration::hours(OVERDUE_GRACE_HOURS) < now
}
