//! Reasoning-stream records and stage events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{TaskId, ThoughtId};
use crate::stage::Stage;

/// A decoded record from the reasoning stream: the SSE `event:` name plus the
/// JSON payload assembled from its `data:` lines.
///
/// The stream reader emits these without interpreting the event name; the
/// aggregator decides which records describe known stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStreamRecord {
    pub event: String,
    pub payload: serde_json::Value,
}

impl RawStreamRecord {
    #[must_use]
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Why a raw record could not become a [`StageEvent`].
///
/// None of these are fatal: the aggregator skips the record and continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageEventParseError {
    #[error("unknown stage name: {0:?}")]
    UnknownStage(String),
    #[error("record payload is missing thought_id")]
    MissingThoughtId,
    #[error("record payload is missing task_id")]
    MissingTaskId,
}

/// A single checkpoint emitted by the reasoning stream. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: Stage,
    pub thought_id: ThoughtId,
    pub task_id: TaskId,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl StageEvent {
    /// Interpret a raw record as a stage event, stamped with `received_at`.
    ///
    /// `thought_id` and `task_id` are read from the payload; records lacking
    /// either, or carrying an unknown stage name, are rejected so the caller
    /// can skip them.
    pub fn from_record(
        record: &RawStreamRecord,
        received_at: DateTime<Utc>,
    ) -> Result<Self, StageEventParseError> {
        let stage = Stage::parse(&record.event)
            .ok_or_else(|| StageEventParseError::UnknownStage(record.event.clone()))?;

        let thought_id = non_empty_str(&record.payload, "thought_id")
            .ok_or(StageEventParseError::MissingThoughtId)?;
        let task_id = non_empty_str(&record.payload, "task_id")
            .ok_or(StageEventParseError::MissingTaskId)?;

        Ok(Self {
            stage,
            thought_id: ThoughtId::new(thought_id),
            task_id: TaskId::new(task_id),
            payload: record.payload.clone(),
            timestamp: received_at,
        })
    }

    /// The task description carried by this event's payload, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        non_empty_str(&self.payload, "description")
    }
}

fn non_empty_str<'a>(payload: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(serde_json::Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
