use chrono::{NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::schema::{Appointment, Modality, Patient};

/// Lifecycle of a queued invoice request. The external workflow webhook
/// moves it out of `pending`; the engine only ever reads it back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Processing,
    Completed,
    Error,
    ErrorSending,
    ErrorConfig,
}

impl InvoiceStatus {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Error | InvoiceStatus::ErrorSending | InvoiceStatus::ErrorConfig
        )
    }

    /// The workflow will not move the request any further on its own.
    pub fn is_final(&self) -> bool {
        *self == InvoiceStatus::Completed || self.is_error()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct InvoiceLineItem {
    pub description: String,
    pub date: NaiveDate,
    pub amount: f64,
}

/// One request appended to the external invoicing queue. Everything below
/// `requested_by` is written back by the external workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct InvoiceRequest {
    pub appointment_ids: Vec<String>,
    pub patient_id: String,
    pub patient_name: String,
    #[serde(default)]
    pub patient_national_id: Option<String>,
    #[serde(default)]
    pub patient_email: Option<String>,
    pub total_price: f64,
    pub line_items: Vec<InvoiceLineItem>,
    pub status: InvoiceStatus,
    pub created_at: NaiveDateTime,
    pub retry_count: u32,
    pub requested_by: String,
    #[serde(default)]
    pub invoice_url: Option<String>,
    #[serde(default)]
    pub invoice_number: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

fn line_item(appointment: &Appointment) -> InvoiceLineItem {
    let description = match appointment.modality {
        Modality::InPerson => "In-person session",
        Modality::Online => "Online session",
    };
    InvoiceLineItem {
        description: description.to_string(),
        date: appointment.date,
        amount: appointment.price.unwrap_or(0.0),
    }
}

/// Builds a `pending` queue entry for one patient's appointments. Pure; the
/// append to the external queue is the caller's side.
pub fn build_invoice_request(
    patient: &Patient,
    appointments: &[&Appointment],
    requested_by: &str,
    now: NaiveDateTime,
) -> Result<InvoiceRequest> {
    if appointments.is_empty() {
        return Err(EngineError::EmptyInvoiceRequest);
    }
    if appointments.iter().any(|a| a.patient_id != patient.id) {
        return Err(EngineError::MixedPatientInvoice);
    }

    let mut sorted: Vec<&Appointment> = appointments.to_vec();
    sorted.sort_by_key(|a| (a.date, a.id.clone()));

    let line_items: Vec<InvoiceLineItem> = sorted.iter().map(|a| line_item(a)).collect();
    let total_price = line_items.iter().map(|item| item.amount).sum();

    Ok(InvoiceRequest {
        appointment_ids: sorted.iter().map(|a| a.id.clone()).collect(),
        patient_id: patient.id.clone(),
        patient_name: patient.display_name(),
        patient_national_id: patient.national_id.clone(),
        patient_email: patient.email.clone(),
        total_price,
        line_items,
        status: InvoiceStatus::Pending,
        created_at: now,
        retry_count: 0,
        requested_by: requested_by.to_string(),
        invoice_url: None,
        invoice_number: None,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AppointmentStatus, PatientSource};

    fn patient() -> Patient {
        Patient {
            id: "p1".to_string(),
            name: "Ana García".to_string(),
            first_name: None,
            last_name: None,
            email: Some("ana@example.com".to_string()),
            phone: None,
            national_id: Some("12345678Z".to_string()),
            fee: Some(10000.0),
            modality: None,
            professional: None,
            active: true,
            discharge: None,
            source: PatientSource::Private,
            birth_date: None,
            guardian: None,
        }
    }

    fn appointment(id: &str, day: u32, price: Option<f64>) -> Appointment {
        Appointment {
            id: id.to_string(),
            patient_id: "p1".to_string(),
            patient_name: "Ana García".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 2, day).unwrap(),
            time: "10:00".to_string(),
            duration_minutes: 50,
            modality: Modality::InPerson,
            status: AppointmentStatus::Completed,
            is_paid: true,
            price,
            charge_on_cancellation: false,
            exclude_from_partner_share: false,
            series: None,
        }
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_build_request() {
        let later = appointment("a2", 17, Some(10000.0));
        let earlier = appointment("a1", 10, Some(10000.0));
        let subject = patient();

        let request =
            build_invoice_request(&subject, &[&later, &earlier], "reception", now()).unwrap();

        // Line items come out in date order regardless of input order.
        assert_eq!(request.appointment_ids, vec!["a1", "a2"]);
        assert_eq!(request.total_price, 20000.0);
        assert_eq!(request.line_items.len(), 2);
        assert_eq!(request.line_items[0].description, "In-person session");
        assert_eq!(request.status, InvoiceStatus::Pending);
        assert_eq!(request.retry_count, 0);
        assert_eq!(request.patient_national_id.as_deref(), Some("12345678Z"));
        assert_eq!(request.requested_by, "reception");
    }

    #[test]
    fn test_missing_price_contributes_zero() {
        let priced = appointment("a1", 10, Some(10000.0));
        let unpriced = appointment("a2", 17, None);

        let request =
            build_invoice_request(&patient(), &[&priced, &unpriced], "reception", now()).unwrap();
        assert_eq!(request.total_price, 10000.0);
    }

    #[test]
    fn test_empty_request_rejected() {
        let result = build_invoice_request(&patient(), &[], "reception", now());
        assert!(matches!(result, Err(EngineError::EmptyInvoiceRequest)));
    }

    #[test]
    fn test_mixed_patients_rejected() {
        let mut foreign = appointment("a1", 10, Some(10000.0));
        foreign.patient_id = "p2".to_string();

        let result = build_invoice_request(&patient(), &[&foreign], "reception", now());
        assert!(matches!(result, Err(EngineError::MixedPatientInvoice)));
    }

    #[test]
    fn test_status_vocabulary() {
        assert_eq!(
            serde_json::to_string(&InvoiceStatus::ErrorSending).unwrap(),
            "\"error_sending\""
        );
        let parsed: InvoiceStatus = serde_json::from_str("\"error_config\"").unwrap();
        assert!(parsed.is_error());
        assert!(parsed.is_final());
        assert!(!InvoiceStatus::Processing.is_final());
        assert!(InvoiceStatus::Completed.is_final());
        assert!(!InvoiceStatus::Completed.is_error());
    }
}
