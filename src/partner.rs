use chrono::NaiveDate;
use futures::future::BoxFuture;
use log::warn;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::ledger::{LedgerKey, LedgerStore, Month, PartnerLedgerEntry};
use crate::schema::Appointment;

/// Share of each eligible session's fee owed to the partner organization.
/// Fixed by contract, not configurable.
pub const PARTNER_SHARE_RATE: f64 = 0.25;

/// Tolerance when comparing a recomputed share against the amount frozen in
/// the ledger.
const RECONCILE_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientShare {
    pub patient_id: String,
    pub patient_name: String,
    pub session_count: u32,
    pub gross_fees: f64,
    pub partner_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthShare {
    pub month: Month,
    pub total_amount: f64,
    /// Ascending by patient display name.
    pub patient_breakdown: Vec<PatientShare>,
    pub is_paid: bool,
    pub paid_date: Option<NaiveDate>,
    /// Amount frozen in the ledger when the month was marked. Stale relative
    /// to `total_amount` when appointments changed afterwards; the ledger
    /// records what was paid, not a live recomputation.
    pub recorded_total: Option<f64>,
}

/// All five conditions must hold for an appointment to count toward the
/// partner share.
pub fn eligible_for_share(
    appointment: &Appointment,
    partner_patient_ids: &HashSet<String>,
    month: Month,
) -> bool {
    appointment.is_paid
        && !appointment.is_no_charge_cancellation()
        && partner_patient_ids.contains(appointment.patient_id.as_str())
        && !appointment.exclude_from_partner_share
        && month.contains(appointment.date)
}

/// Computes the partner's share for one month. Pure: the ledger map is only
/// read, never written, and the computed total is not persisted here.
pub fn compute_month_share(
    appointments: &[Appointment],
    partner_patient_ids: &HashSet<String>,
    month: Month,
    ledger: &BTreeMap<String, PartnerLedgerEntry>,
    professional: Option<&str>,
) -> MonthShare {
    let mut buckets: BTreeMap<String, PatientShare> = BTreeMap::new();

    for appointment in appointments
        .iter()
        .filter(|a| eligible_for_share(a, partner_patient_ids, month))
    {
        let fee = appointment.price.unwrap_or(0.0);
        let bucket = buckets
            .entry(appointment.patient_id.clone())
            .or_insert_with(|| PatientShare {
                patient_id: appointment.patient_id.clone(),
                patient_name: appointment.patient_name.clone(),
                session_count: 0,
                gross_fees: 0.0,
                partner_amount: 0.0,
            });
        bucket.session_count += 1;
        bucket.gross_fees += fee;
        bucket.partner_amount += fee * PARTNER_SHARE_RATE;
    }

    let mut patient_breakdown: Vec<PatientShare> = buckets.into_values().collect();
    patient_breakdown.sort_by(|a, b| {
        a.patient_name
            .to_lowercase()
            .cmp(&b.patient_name.to_lowercase())
            .then_with(|| a.patient_name.cmp(&b.patient_name))
    });

    let total_amount: f64 = patient_breakdown.iter().map(|p| p.partner_amount).sum();

    let key = LedgerKey::new(month, professional);
    let entry = ledger.get(&key.storage_key());

    if let Some(entry) = entry {
        if entry.is_paid && (entry.total_amount - total_amount).abs() > RECONCILE_EPSILON {
            warn!(
                "partner share for '{}' drifted since it was marked paid: ledger holds {:.2}, recomputed {:.2}",
                key.storage_key(),
                entry.total_amount,
                total_amount
            );
        }
    }

    MonthShare {
        month,
        total_amount,
        patient_breakdown,
        is_paid: entry.map(|e| e.is_paid).unwrap_or(false),
        paid_date: entry.and_then(|e| e.paid_date),
        recorded_total: entry.map(|e| e.total_amount),
    }
}

/// Writes the paid/unpaid state for a month, freezing `current_total` as the
/// recorded amount. Idempotent; last writer wins.
pub fn mark_month_paid<'a, S>(
    store: &'a S,
    month: Month,
    professional: Option<&str>,
    is_paid: bool,
    current_total: f64,
    today: NaiveDate,
) -> BoxFuture<'a, Result<()>>
where
    S: LedgerStore + ?Sized,
{
    let key = LedgerKey::new(month, professional);
    let entry = PartnerLedgerEntry {
        month,
        total_amount: current_total,
        is_paid,
        paid_date: is_paid.then_some(today),
    };
    store.upsert(key, entry)
}

/// Conditional variant of [`mark_month_paid`]: the write only lands while
/// the stored entry still equals `expected`, closing the race between a
/// concurrent mark and unmark on stores that support it.
pub fn mark_month_paid_guarded<'a, S>(
    store: &'a S,
    month: Month,
    professional: Option<&str>,
    expected: Option<PartnerLedgerEntry>,
    is_paid: bool,
    current_total: f64,
    today: NaiveDate,
) -> BoxFuture<'a, Result<()>>
where
    S: LedgerStore + ?Sized,
{
    let key = LedgerKey::new(month, professional);
    let entry = PartnerLedgerEntry {
        month,
        total_amount: current_total,
        is_paid,
        paid_date: is_paid.then_some(today),
    };
    store.compare_and_upsert(key, expected, entry)
}
