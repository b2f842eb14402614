//! # Clinic Revenue Engine
//!
//! A library for turning a mental-health practice's appointment, patient and
//! payment records into balances, partner revenue shares and income
//! projections.
//!
//! ## Core Concepts
//!
//! - **Balance**: per-patient outstanding debt and payment history
//! - **Partner Share**: the fixed 25% owed to the partner organization for
//!   eligible sessions of partner-affiliated patients, with a persisted
//!   paid/unpaid ledger per month
//! - **Agenda Statistics**: attendance, cancellation and no-show rates over
//!   a trailing 3-month window
//! - **Income Projection**: next-period gross/net revenue from per-patient
//!   session averages, with transient overrides
//!
//! Every calculator is a pure function of the in-memory collections plus an
//! injected "now"; the only mutable state is the partner-payment ledger,
//! written through [`LedgerStore`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use clinic_revenue_engine::*;
//!
//! let data: PracticeData = fetch_snapshot_from_store();
//! let ledger = fetch_partner_ledger();
//! let month: Month = "2026-02".parse()?;
//!
//! let share = compute_month_share(
//!     &data.appointments,
//!     &data.partner_patient_ids(),
//!     month,
//!     &ledger,
//!     None,
//! );
//! println!("owed to partner: {:.2}", share.total_amount);
//! ```

pub mod balance;
pub mod error;
pub mod invoice;
pub mod ledger;
pub mod partner;
pub mod projection;
pub mod schedule;
pub mod schema;
pub mod stats;
pub mod utils;

pub use balance::{compute_balance, is_overdue, PatientBalance, OVERDUE_GRACE_HOURS};
pub use error::{EngineError, Result};
pub use invoice::*;
pub use ledger::{
    sanitize_key_component, InMemoryLedger, LedgerKey, LedgerStore, Month, PartnerLedgerEntry,
    FORBIDDEN_KEY_CHARS,
};
pub use partner::{
    compute_month_share, eligible_for_share, mark_month_paid, mark_month_paid_guarded, MonthShare,
    PatientShare, PARTNER_SHARE_RATE,
};
pub use projection::{
    project_income, project_practice_income, IncomeProjection, PatientProjection, ProjectedIncome,
};
pub use schedule::*;
pub use schema::*;
pub use stats::{
    compute_stats, counts_as_completed, AgendaStats, PatientActivity,
    DEFAULT_SESSIONS_PER_MONTH, STATS_WINDOW_MONTHS,
};

use chrono::NaiveDateTime;
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};

/// Everything one recompute pass produces for the UI: per-patient balances,
/// the month's partner share, agenda statistics and the income projection.
#[derive(Debug, Clone)]
pub struct PracticeReport {
    pub balances: BTreeMap<String, PatientBalance>,
    pub month_share: MonthShare,
    pub stats: AgendaStats,
    pub projection: IncomeProjection,
}

pub struct PracticeProcessor;

impl PracticeProcessor {
    /// Runs all four calculators over one data snapshot. Re-invoked by the
    /// hosting application on every store push or filter change; the output
    /// depends only on the arguments, so recomputation is idempotent.
    pub fn process(
        data: &PracticeData,
        ledger: &BTreeMap<String, PartnerLedgerEntry>,
        month: Month,
        professional: Option<&str>,
        session_overrides: &HashMap<String, f64>,
        now: NaiveDateTime,
    ) -> Result<PracticeReport> {
        validate_amounts(data)?;

        info!(
            "computing practice report for {} ({} appointments, {} patients, {} payments)",
            month,
            data.appointments.len(),
            data.patients.len(),
            data.payments.len()
        );

        let mut appointments_by_patient: HashMap<String, Vec<Appointment>> = HashMap::new();
        for appointment in &data.appointments {
            appointments_by_patient
                .entry(appointment.patient_id.clone())
                .or_default()
                .push(appointment.clone());
        }
        let mut payments_by_patient: HashMap<String, Vec<Payment>> = HashMap::new();
        for payment in &data.payments {
            payments_by_patient
                .entry(payment.patient_id.clone())
                .or_default()
                .push(payment.clone());
        }

        let empty_appointments: Vec<Appointment> = Vec::new();
        let empty_payments: Vec<Payment> = Vec::new();
        let balances: BTreeMap<String, PatientBalance> = data
            .patients
            .iter()
            .map(|patient| {
                let appointments = appointments_by_patient
                    .get(&patient.id)
                    .unwrap_or(&empty_appointments);
                let payments = payments_by_patient
                    .get(&patient.id)
                    .unwrap_or(&empty_payments);
                (
                    patient.id.clone(),
                    compute_balance(appointments, payments, now),
                )
            })
            .collect();

        let month_share = compute_month_share(
            &data.appointments,
            &data.partner_patient_ids(),
            month,
            ledger,
            professional,
        );
        let stats = compute_stats(&data.appointments, &data.patients, now.date());
        let projection = project_practice_income(&stats, session_overrides);

        debug!(
            "partner share {:.2} across {} patients; projected net {:.2}",
            month_share.total_amount,
            month_share.patient_breakdown.len(),
            projection.totals.net
        );

        Ok(PracticeReport {
            balances,
            month_share,
            stats,
            projection,
        })
    }
}

pub fn compute_practice_report(
    data: &PracticeData,
    ledger: &BTreeMap<String, PartnerLedgerEntry>,
    month: Month,
    professional: Option<&str>,
    session_overrides: &HashMap<String, f64>,
    now: NaiveDateTime,
) -> Result<PracticeReport> {
    PracticeProcessor::process(data, ledger, month, professional, session_overrides, now)
}

/// Absent prices and fees are fine (they contribute 0), but a NaN or
/// infinite amount would silently poison every downstream sum, so those are
/// rejected up front.
fn validate_amounts(data: &PracticeData) -> Result<()> {
    for appointment in &data.appointments {
        if let Some(price) = appointment.price {
            if !price.is_finite() {
                return Err(EngineError::NonFiniteAmount {
                    record: format!("appointment {}", appointment.id),
                    value: price,
                });
            }
        }
    }
    for patient in &data.patients {
        if let Some(fee) = patient.fee {
            if !fee.is_finite() {
                return Err(EngineError::NonFiniteAmount {
                    record: format!("patient {}", patient.id),
                    value: fee,
                });
            }
        }
    }
    for payment in &data.payments {
        if !payment.amount.is_finite() {
            return Err(EngineError::NonFiniteAmount {
                record: format!("payment {}", payment.id),
                value: payment.amount,
            });
        }
    }
    Ok(())
}
