use serde::Serialize;
use std::collections::HashMap;

use crate::partner::PARTNER_SHARE_RATE;
use crate::stats::AgendaStats;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ProjectedIncome {
    pub gross: f64,
    pub net: f64,
    pub partner_discount: f64,
}

/// Projects one patient's next-period income. The partner discount applies
/// only to affiliated patients that are not opted out.
pub fn project_income(
    fee: f64,
    session_count: f64,
    partner_affiliated: bool,
    exclude_from_partner: bool,
) -> ProjectedIncome {
    let gross = fee * session_count;
    let partner_discount = if partner_affiliated && !exclude_from_partner {
        gross * PARTNER_SHARE_RATE
    } else {
        0.0
    };
    ProjectedIncome {
        gross,
        net: gross - partner_discount,
        partner_discount,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientProjection {
    pub patient_id: String,
    pub patient_name: String,
    pub fee: f64,
    /// Projected sessions for the coming month: the patient's observed
    /// monthly average, the practice average when they have no history, or
    /// a caller-supplied override.
    pub session_count: f64,
    pub overridden: bool,
    pub income: ProjectedIncome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncomeProjection {
    pub patients: Vec<PatientProjection>,
    pub totals: ProjectedIncome,
}

/// Aggregate projection across every active patient with a non-zero fee.
/// Overrides are transient UI state: clamped to zero or more sessions,
/// never persisted, and only fed into [`project_income`].
pub fn project_practice_income(
    stats: &AgendaStats,
    overrides: &HashMap<String, f64>,
) -> IncomeProjection {
    let mut patients = Vec::new();
    let mut totals = ProjectedIncome::default();

    for row in stats.patients.iter().filter(|r| r.fee > 0.0) {
        let default_count = if row.sessions_in_window > 0 {
            row.avg_sessions_per_month
        } else {
            stats.avg_sessions_per_patient
        };
        let (session_count, overridden) = match overrides.get(&row.patient_id) {
            Some(value) => (value.max(0.0), true),
            None => (default_count, false),
        };

        let income = project_income(row.fee, session_count, row.partner_affiliated, false);
        totals.gross += income.gross;
        totals.net += income.net;
        totals.partner_discount += income.partner_discount;

        patients.push(PatientProjection {
            patient_id: row.patient_id.clone(),
            patient_name: row.patient_name.clone(),
            fee: row.fee,
            session_count,
            overridden,
            income,
        });
    }

    IncomeProjection { patients, totals }
}
