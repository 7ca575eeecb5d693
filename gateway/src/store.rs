use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Fields every saved workout must carry. Together they form the duplicate key.
pub const REQUIRED_FIELDS: [&str; 5] = ["age", "gender", "height", "weight", "bmi"];

pub type Fields = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WorkoutRecord {
    pub id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl WorkoutRecord {
    /// True if both records carry equal values for every required field.
    pub fn same_key(&self, candidate: &Fields) -> bool {
        REQUIRED_FIELDS
            .iter()
            .all(|key| values_equal(self.fields.get(*key), candidate.get(*key)))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("A matching workout record already exists")]
    Conflict,
}

/// Returns the required fields that are absent, null or empty strings.
pub fn missing_fields(fields: &Fields) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|key| match fields.get(*key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(_) => false,
        })
        .collect()
}

// Numbers compare by value so that 170 and 170.0 are the same height.
fn values_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (a, b) => a == b,
    }
}

#[derive(Default)]
struct Inner {
    records: Vec<WorkoutRecord>,
    last_id: i64,
}

impl Inner {
    fn exists(&self, candidate: &Fields) -> bool {
        self.records.iter().any(|r| r.same_key(candidate))
    }

    fn add(&mut self, mut fields: Fields, now: DateTime<Utc>) -> WorkoutRecord {
        // ids are millisecond timestamps, bumped when two saves land in the same millisecond
        let id = now.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;

        fields.remove("id");
        fields.remove("timestamp");

        let record = WorkoutRecord {
            id: id.to_string(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            fields,
        };
        self.records.push(record.clone());
        record
    }
}

/// In-memory list of saved workouts. Lives as long as the process.
#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<Mutex<Inner>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores the fields under a fresh id and creation timestamp.
    pub fn add(&self, fields: Fields) -> WorkoutRecord {
        self.lock().add(fields, Utc::now())
    }

    pub fn exists(&self, candidate: &Fields) -> bool {
        self.lock().exists(candidate)
    }

    /// Checks for a duplicate and stores the record under one lock, so two
    /// identical concurrent saves cannot both succeed.
    pub fn insert_unique(&self, fields: Fields) -> Result<WorkoutRecord, StoreError> {
        let mut inner = self.lock();
        if inner.exists(&fields) {
            return Err(StoreError::Conflict);
        }
        Ok(inner.add(fields, Utc::now()))
    }

    pub fn find_by_id(&self, id: &str) -> Option<WorkoutRecord> {
        self.lock().records.iter().find(|r| r.id == id).cloned()
    }

    /// All records in insertion order.
    pub fn all(&self) -> Vec<WorkoutRecord> {
        self.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
