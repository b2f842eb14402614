use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Non-finite amount on {record}: {value}")]
    NonFiniteAmount { record: String, value: f64 },

    #[error("Invoice request needs at least one appointment")]
    EmptyInvoiceRequest,

    #[error("Invoice request spans multiple patients")]
    MixedPatientInvoice,

    #[error("Ledger write conflict at key '{key}': entry changed since it was read")]
    LedgerConflict { key: String },

    #[error("Ledger write failed: {0}")]
    LedgerWrite(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
