use chrono::{Datelike, NaiveDate};
use futures::future::{self, BoxFuture, FutureExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{EngineError, Result};

/// Characters the document store forbids in keys. Each one is replaced with
/// `_` when a professional name becomes part of a ledger key.
pub const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

/// A calendar month. Serialized as `YYYY-MM`; the derived ordering matches
/// lexicographic order of that form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::InvalidMonth(format!("{:04}-{:02}", year, month)));
        }
        Ok(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Equivalent to the `YYYY-MM` prefix match on a `YYYY-MM-DD` date
    /// string.
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || EngineError::InvalidMonth(raw.to_string());
        let (year_part, month_part) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = year_part.parse().map_err(|_| invalid())?;
        let month: u32 = month_part.parse().map_err(|_| invalid())?;
        Month::new(year, month).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Month {
    type Error = EngineError;

    fn try_from(raw: String) -> Result<Self> {
        raw.parse()
    }
}

impl From<Month> for String {
    fn from(month: Month) -> Self {
        month.to_string()
    }
}

impl JsonSchema for Month {
    fn schema_name() -> String {
        "Month".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(gen)
    }
}

pub fn sanitize_key_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if FORBIDDEN_KEY_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Composite ledger key: month plus optional professional scope. The
/// sanitized string form only exists as the storage encoding, so writes and
/// reads always derive it the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    month: Month,
    professional: Option<String>,
}

impl LedgerKey {
    pub fn new(month: Month, professional: Option<&str>) -> Self {
        Self {
            month,
            professional: professional.map(str::to_string),
        }
    }

    pub fn month(&self) -> Month {
        self.month
    }

    pub fn professional(&self) -> Option<&str> {
        self.professional.as_deref()
    }

    /// `YYYY-MM`, or `YYYY-MM_<sanitized professional>` when scoped.
    pub fn storage_key(&self) -> String {
        match &self.professional {
            Some(name) => format!("{}_{}", self.month, sanitize_key_component(name)),
            None => self.month.to_string(),
        }
    }
}

/// One row of the persisted partner-payment ledger. `total_amount` is frozen
/// at mark-as-paid time; it is never recomputed in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PartnerLedgerEntry {
    pub month: Month,
    pub total_amount: f64,
    pub is_paid: bool,
    #[serde(default)]
    pub paid_date: Option<NaiveDate>,
}

/// Write surface of the external ledger store. Reads are not part of the
/// trait: the hosting application supplies the current ledger map alongside
/// the other collections (subscription push), and the calculators only look
/// entries up in that snapshot.
pub trait LedgerStore {
    /// Idempotent upsert; last writer wins. Failures surface unchanged, the
    /// engine never retries.
    fn upsert(&self, key: LedgerKey, entry: PartnerLedgerEntry) -> BoxFuture<'_, Result<()>>;

    /// Conditional upsert for stores with compare-and-swap support: the
    /// write only lands while the stored entry still equals `expected`
    /// (`None` meaning no entry). The default implementation falls back to
    /// plain last-write-wins `upsert`.
    fn compare_and_upsert(
        &self,
        key: LedgerKey,
        expected: Option<PartnerLedgerEntry>,
        entry: PartnerLedgerEntry,
    ) -> BoxFuture<'_, Result<()>> {
        let _ = expected;
        self.upsert(key, entry)
    }
}

/// Reference store used in tests and as the model for real backends. Unlike
/// the default trait fallback it implements genuine compare-and-swap.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<BTreeMap<String, PartnerLedgerEntry>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (LedgerKey, PartnerLedgerEntry)>,
    {
        let map = entries
            .into_iter()
            .map(|(key, entry)| (key.storage_key(), entry))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, PartnerLedgerEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, key: &LedgerKey) -> Option<PartnerLedgerEntry> {
        self.lock().get(&key.storage_key()).cloned()
    }

    /// Clone of the current contents, in the shape the calculators read.
    pub fn snapshot(&self) -> BTreeMap<String, PartnerLedgerEntry> {
        self.lock().clone()
    }
}

impl LedgerStore for InMemoryLedger {
    fn upsert(&self, key: LedgerKey, entry: PartnerLedgerEntry) -> BoxFuture<'_, Result<()>> {
        self.lock().insert(key.storage_key(), entry);
        future::ready(Ok(())).boxed()
    }

    fn compare_and_upsert(
        &self,
        key: LedgerKey,
        expected: Option<PartnerLedgerEntry>,
        entry: PartnerLedgerEntry,
    ) -> BoxFuture<'_, Result<()>> {
        let mut entries = self.lock();
        let storage_key = key.storage_key();
        let result = if entries.get(&storage_key) == expected.as_ref() {
            entries.insert(storage_key, entry);
            Ok(())
        } else {
            Err(EngineError::LedgerConflict { key: storage_key })
        };
        future::ready(result).boxed()
    }
}
