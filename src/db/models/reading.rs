//! One sampled observation in the people log.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::SubjectKey;

/// A reading as stored. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub id: i64,
    pub subject: SubjectKey,
    pub timestamp: NaiveDateTime,
    pub count: u32,
}

/// A reading waiting to be appended; the log assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReading {
    pub subject: SubjectKey,
    pub timestamp: NaiveDateTime,
    pub count: u32,
}

impl NewReading {
    pub fn new(subject: SubjectKey, timestamp: NaiveDateTime, count: u32) -> Self {
        Self {
            subject,
            timestamp,
            count,
        }
    }
}
