use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ledger::Month;
use crate::utils::parse_clock_time;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Modality {
    InPerson,
    Online,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    #[schemars(description = "Booked and not yet held")]
    Scheduled,

    #[schemars(description = "Session took place and was closed out")]
    Completed,

    #[schemars(
        description = "Cancelled ahead of time. Only generates debt when charge_on_cancellation is set."
    )]
    Cancelled,

    #[schemars(description = "Patient did not attend and did not cancel")]
    NoShow,

    #[schemars(description = "Patient checked in; session held but not yet closed out")]
    Present,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceRule {
    Weekly,
    Biweekly,
    Monthly,
}

/// Link from one appointment back to the recurring series that generated it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct RecurrenceRef {
    pub series_id: String,
    pub index: u32,
    pub rule: RecurrenceRule,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Appointment {
    pub id: String,

    pub patient_id: String,

    #[schemars(description = "Display name denormalized onto the appointment for listings")]
    pub patient_name: String,

    #[schemars(description = "Calendar day of the session (no timezone)")]
    pub date: NaiveDate,

    #[schemars(
        description = "Start time as free text, normally HH:MM. Unparseable values are treated as midnight, never rejected."
    )]
    pub time: String,

    pub duration_minutes: u32,

    pub modality: Modality,

    pub status: AppointmentStatus,

    #[serde(default)]
    pub is_paid: bool,

    #[schemars(description = "Session price. Absent or zero while the fee is not yet filled in; contributes 0 to every sum.")]
    #[serde(default)]
    pub price: Option<f64>,

    #[schemars(
        description = "A cancellation that still bills the patient (late cancellation). Without it a cancelled session generates no debt and no partner share."
    )]
    #[serde(default)]
    pub charge_on_cancellation: bool,

    #[schemars(
        description = "Per-appointment opt-out from the partner revenue share, even when the patient is partner-affiliated."
    )]
    #[serde(default)]
    pub exclude_from_partner_share: bool,

    #[serde(default)]
    pub series: Option<RecurrenceRef>,
}

impl Appointment {
    /// Scheduled start as a point on the clinic's local clock. Falls back to
    /// midnight when the stored time string does not parse.
    pub fn start_instant(&self) -> NaiveDateTime {
        let time = parse_clock_time(&self.time).unwrap_or(NaiveTime::MIN);
        self.date.and_time(time)
    }

    /// Cancelled without the billable-cancellation flag: excluded from debt
    /// and from the partner share regardless of any other field.
    pub fn is_no_charge_cancellation(&self) -> bool {
        self.status == AppointmentStatus::Cancelled && !self.charge_on_cancellation
    }

    pub fn month(&self) -> Month {
        Month::from_date(self.date)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PatientSource {
    #[schemars(
        description = "Referred through the partner organization; every billed session owes the fixed revenue share unless the appointment opts out."
    )]
    Partner,

    #[schemars(description = "Private patient; no revenue share applies")]
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Discharge {
    pub date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Contact responsible for a minor. Only meaningful while the patient is
/// under age.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Guardian {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Patient {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub phone: Option<String>,

    #[schemars(description = "National identity number, used when requesting invoices")]
    #[serde(default)]
    pub national_id: Option<String>,

    #[schemars(description = "Nominal per-session fee. Absent while not yet agreed.")]
    #[serde(default)]
    pub fee: Option<f64>,

    #[serde(default)]
    pub modality: Option<Modality>,

    #[serde(default)]
    pub professional: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    #[serde(default)]
    pub discharge: Option<Discharge>,

    pub source: PatientSource,

    #[serde(default)]
    pub birth_date: Option<NaiveDate>,

    #[serde(default)]
    pub guardian: Option<Guardian>,
}

fn default_active() -> bool {
    true
}

impl Patient {
    pub fn display_name(&self) -> String {
        if !self.name.trim().is_empty() {
            return self.name.clone();
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => String::new(),
        }
    }

    /// Age in whole years on `today`, or `None` when the birth date is
    /// missing or in the future ("age unknown", never an error).
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        if birth > today {
            return None;
        }
        let mut age = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    pub fn is_minor_on(&self, today: NaiveDate) -> Option<bool> {
        self.age_on(today).map(|age| age < 18)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Payment {
    pub id: String,

    pub patient_id: String,

    pub amount: f64,

    #[schemars(description = "Free-text concept, e.g. 'June sessions'")]
    #[serde(default)]
    pub concept: Option<String>,

    pub recorded_at: NaiveDateTime,

    #[schemars(
        description = "Appointment this receipt settles, when it settles exactly one. Recording such a payment also marks that appointment paid."
    )]
    #[serde(default)]
    pub appointment_id: Option<String>,
}

/// One in-memory snapshot of the three store collections the calculators
/// consume. How the collections are fetched or streamed is the hosting
/// application's concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PracticeData {
    pub appointments: Vec<Appointment>,
    pub patients: Vec<Patient>,
    pub payments: Vec<Payment>,
}

impl PracticeData {
    /// Ids of every partner-affiliated patient, the eligibility set for the
    /// revenue-share calculator.
    pub fn partner_patient_ids(&self) -> HashSet<String> {
        self.patients
            .iter()
            .filter(|p| p.source == PatientSource::Partner)
            .map(|p| p.id.clone())
            .collect()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PracticeData)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_generation() {
        let schema_json = PracticeData::schema_as_json().unwrap();
        assert!(schema_json.contains("appointments"));
        assert!(schema_json.contains("charge_on_cancellation"));
        assert!(schema_json.contains("exclude_from_partner_share"));
    }

    #[test]
    fn test_appointment_serialization_defaults() {
        let json = r#"{
            "id": "a1",
            "patient_id": "p1",
            "patient_name": "Ana",
            "date": "2026-02-10",
            "time": "10:00",
            "duration_minutes": 50,
            "modality": "in-person",
            "status": "no-show"
        }"#;

        let appointment: Appointment = serde_json::from_str(json).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::NoShow);
        assert_eq!(appointment.modality, Modality::InPerson);
        assert!(!appointment.is_paid);
        assert!(!appointment.charge_on_cancellation);
        assert!(!appointment.exclude_from_partner_share);
        assert_eq!(appointment.price, None);
        assert!(appointment.series.is_none());
    }

    #[test]
    fn test_start_instant_falls_back_to_midnight() {
        let mut appointment: Appointment = serde_json::from_str(
            r#"{
            "id": "a1",
            "patient_id": "p1",
            "patient_name": "Ana",
            "date": "2026-02-10",
            "time": "15:30",
            "duration_minutes": 50,
            "modality": "online",
            "status": "scheduled"
        }"#,
        )
        .unwrap();

        assert_eq!(
            appointment.start_instant(),
            NaiveDate::from_ymd_opt(2026, 2, 10)
                .unwrap()
                .and_hms_opt(15, 30, 0)
                .unwrap()
        );

        appointment.time = "whenever".to_string();
        assert_eq!(
            appointment.start_instant(),
            NaiveDate::from_ymd_opt(2026, 2, 10)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_patient_age() {
        let patient = Patient {
            id: "p1".to_string(),
            name: "Ana".to_string(),
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            national_id: None,
            fee: Some(10000.0),
            modality: None,
            professional: None,
            active: true,
            discharge: None,
            source: PatientSource::Private,
            birth_date: NaiveDate::from_ymd_opt(2010, 6, 15),
            guardian: None,
        };

        let today = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        assert_eq!(patient.age_on(today), Some(15));
        assert_eq!(patient.is_minor_on(today), Some(true));

        let birthday = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(patient.age_on(birthday), Some(16));

        let unknown = Patient {
            birth_date: None,
            ..patient
        };
        assert_eq!(unknown.age_on(today), None);
        assert_eq!(unknown.is_minor_on(today), None);
    }

    #[test]
    fn test_display_name_from_split_fields() {
        let mut patient = Patient {
            id: "p1".to_string(),
            name: String::new(),
            first_name: Some("Ana".to_string()),
            last_name: Some("García".to_string()),
            email: None,
            phone: None,
            national_id: None,
            fee: None,
            modality: None,
            professional: None,
            active: true,
            discharge: None,
            source: PatientSource::Partner,
            birth_date: None,
            guardian: None,
        };

        assert_eq!(patient.display_name(), "Ana García");

        patient.name = "Ana G.".to_string();
        assert_eq!(patient.display_name(), "Ana G.");
    }

    #[test]
    fn test_partner_patient_ids() {
        let data = PracticeData {
            appointments: vec![],
            payments: vec![],
            patients: vec![
                Patient {
                    id: "p1".to_string(),
                    name: "Ana".to_string(),
                    first_name: None,
                    last_name: None,
                    email: None,
                    phone: None,
                    national_id: None,
                    fee: None,
                    modality: None,
                    professional: None,
                    active: true,
                    discharge: None,
                    source: PatientSource::Partner,
                    birth_date: None,
                    guardian: None,
                },
                Patient {
                    id: "p2".to_string(),
                    name: "Bruno".to_string(),
                    first_name: None,
                    last_name: None,
                    email: None,
                    phone: None,
                    national_id: None,
                    fee: None,
                    modality: None,
                    professional: None,
                    active: true,
                    discharge: None,
                    source: PatientSource::Private,
                    birth_date: None,
                    guardian: None,
                },
            ],
        };

        let ids = data.partner_patient_ids();
        assert!(ids.contains("p1"));
        assert!(!ids.contains("p2"));
    }
}
