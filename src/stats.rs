use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

use crate::schema::{Appointment, AppointmentStatus, Patient, PatientSource};
use crate::utils::{round1, round2, round3, trailing_window_start};

/// Trailing window the agenda statistics cover, in calendar months, the
/// partial current month included.
pub const STATS_WINDOW_MONTHS: u32 = 3;

/// Assumed monthly sessions per patient when no patient had any session in
/// the window. Keeps projections meaningful instead of degrading to zero.
pub const DEFAULT_SESSIONS_PER_MONTH: f64 = 4.0;

/// Attendance and billing are recorded independently, so a paid session
/// counts as completed even when its status was never updated. Kept as a
/// named rule rather than folded into the status enum.
pub fn counts_as_completed(appointment: &Appointment) -> bool {
    matches!(
        appointment.status,
        AppointmentStatus::Completed | AppointmentStatus::Present
    ) || appointment.is_paid
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientActivity {
    pub patient_id: String,
    pub patient_name: String,
    pub sessions_in_window: u32,
    pub avg_sessions_per_month: f64,
    /// Nominal per-session fee; 0 while not yet agreed.
    pub fee: f64,
    pub partner_affiliated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgendaStats {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub completed_sessions: u32,
    pub no_shows: u32,
    pub cancellations: u32,
    /// no-shows / (completed + no-shows + cancellations), 3 decimals, 0 on
    /// an empty denominator.
    pub no_show_rate: f64,
    pub cancellation_rate: f64,
    /// Mean monthly session count over patients with at least one session
    /// in the window, or [`DEFAULT_SESSIONS_PER_MONTH`].
    pub avg_sessions_per_patient: f64,
    /// Mean non-zero nominal fee across active patients, 0 if none.
    pub avg_fee: f64,
    /// Mean realized price per completed session; falls back to `avg_fee`
    /// when the window has no completed sessions.
    pub avg_session_value: f64,
    /// One row per active patient, ascending by name.
    pub patients: Vec<PatientActivity>,
}

/// Pure function of the two collections and an injected `today`; nothing in
/// here reads the wall clock.
pub fn compute_stats(
    appointments: &[Appointment],
    patients: &[Patient],
    today: NaiveDate,
) -> AgendaStats {
    let window_start = trailing_window_start(today, STATS_WINDOW_MONTHS);

    let mut completed_sessions = 0u32;
    let mut no_shows = 0u32;
    let mut cancellations = 0u32;
    let mut completed_revenue = 0.0f64;
    let mut sessions_by_patient: HashMap<&str, u32> = HashMap::new();

    for appointment in appointments
        .iter()
        .filter(|a| a.date >= window_start && a.date <= today)
    {
        if counts_as_completed(appointment) {
            completed_sessions += 1;
            completed_revenue += appointment.price.unwrap_or(0.0);
            *sessions_by_patient
                .entry(appointment.patient_id.as_str())
                .or_default() += 1;
        } else if appointment.status == AppointmentStatus::NoShow {
            no_shows += 1;
        } else if appointment.status == AppointmentStatus::Cancelled {
            cancellations += 1;
        }
        // Anything else is a pending scheduled session and stays out of the
        // rate denominators.
    }

    let denominator = completed_sessions + no_shows + cancellations;
    let rate = |count: u32| {
        if denominator == 0 {
            0.0
        } else {
            round3(count as f64 / denominator as f64)
        }
    };
    let no_show_rate = rate(no_shows);
    let cancellation_rate = rate(cancellations);

    let months = STATS_WINDOW_MONTHS as f64;
    let mut rows: Vec<PatientActivity> = patients
        .iter()
        .filter(|p| p.active)
        .map(|patient| {
            let sessions_in_window = sessions_by_patient
                .get(patient.id.as_str())
                .copied()
                .unwrap_or(0);
            PatientActivity {
                patient_id: patient.id.clone(),
                patient_name: patient.display_name(),
                sessions_in_window,
                avg_sessions_per_month: round1(sessions_in_window as f64 / months),
                fee: patient.fee.unwrap_or(0.0),
                partner_affiliated: patient.source == PatientSource::Partner,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.patient_name
            .to_lowercase()
            .cmp(&b.patient_name.to_lowercase())
            .then_with(|| a.patient_name.cmp(&b.patient_name))
    });

    let monthly_counts: Vec<f64> = rows
        .iter()
        .filter(|r| r.sessions_in_window > 0)
        .map(|r| r.sessions_in_window as f64 / months)
        .collect();
    let avg_sessions_per_patient = if monthly_counts.is_empty() {
        DEFAULT_SESSIONS_PER_MONTH
    } else {
        round1(monthly_counts.iter().sum::<f64>() / monthly_counts.len() as f64)
    };

    let fees: Vec<f64> = rows.iter().filter(|r| r.fee > 0.0).map(|r| r.fee).collect();
    let avg_fee = if fees.is_empty() {
        0.0
    } else {
        round2(fees.iter().sum::<f64>() / fees.len() as f64)
    };

    let avg_session_value = if completed_sessions == 0 {
        avg_fee
    } else {
        round2(completed_revenue / completed_sessions as f64)
    };

    AgendaStats {
        window_start,
        window_end: today,
        completed_sessions,
        no_shows,
        cancellations,
        no_show_rate,
        cancellation_rate,
        avg_sessions_per_patient,
        avg_fee,
        avg_session_value,
        patients: rows,
    }
}
