// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence layer for work items, process steps and transitions.
//!
//! The [`Store`] trait is the only seam the engine and handlers see; the
//! PostgreSQL implementation lives in [`postgres`]. Row types returned by
//! queries are separate from the domain model so nullable columns collapse
//! to defaults in exactly one place.

pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AuditSnapshot, Boundary, ExpectedLatest, ProcessStep, Transition, WorkItem};
use crate::error::{CoreError, Result};

pub use postgres::PostgresStore;

/// Fields of a process step definition, as supplied by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    /// Step name.
    pub name: String,
    /// Location label.
    pub location: String,
    /// Entry QR code.
    pub input_qr: String,
    /// Exit QR code.
    pub output_qr: String,
    /// Named parameters.
    pub params: BTreeMap<String, String>,
}

/// Storage abstraction over work items, process steps and transition history.
///
/// `record_entry` and `record_exit` are the only mutating scan paths; both
/// re-check the latest transition inside their own transaction and fail with
/// [`CoreError::Conflict`] when a concurrent scan got there first.
#[async_trait]
pub trait Store: Send + Sync {
    /// Find the non-archived step whose input or output QR equals `code`.
    async fn find_step_by_qr(&self, code: &str) -> Result<Option<ProcessStep>>;

    /// Fetch a step by id, archived definitions included so history stays
    /// readable after a soft delete.
    async fn get_step(&self, step_id: i32) -> Result<Option<ProcessStep>>;

    /// Fetch the definitions for the given ids, in the order the ids appear.
    /// Ids with no definition are skipped.
    async fn steps_for(&self, step_ids: &[i32]) -> Result<Vec<ProcessStep>>;

    /// Find the work item a scanned source QR refers to. When several work
    /// items share the QR, an in-progress item wins over a not-started one,
    /// which wins over a completed one; ties go to the most recently
    /// registered.
    async fn find_work_item_by_qr(&self, code: &str) -> Result<Option<WorkItem>>;

    /// Fetch a work item by serial.
    async fn get_work_item(&self, serial: &str) -> Result<Option<WorkItem>>;

    /// The most recent transition for a work item, if any.
    async fn latest_transition(&self, serial: &str) -> Result<Option<Transition>>;

    /// Full transition history for a work item, newest first.
    async fn list_transitions(&self, serial: &str) -> Result<Vec<Transition>>;

    /// Audit snapshots for a work item, newest first. These carry the step
    /// definitions as they were at scan time, independent of later edits.
    async fn snapshots_for(&self, serial: &str) -> Result<Vec<AuditSnapshot>>;

    /// Record a step entry: open an audit snapshot of the work item and step
    /// as they are right now, then append the entry transition. `expected`
    /// is re-checked under lock; a mismatch is a [`CoreError::Conflict`].
    async fn record_entry(
        &self,
        work: &WorkItem,
        step: &ProcessStep,
        expected: ExpectedLatest,
    ) -> Result<Transition>;

    /// Record a step exit: append the exit transition and close the audit
    /// snapshot opened by the matching entry. The latest transition must be
    /// the entry of `step`; anything else is a [`CoreError::Conflict`].
    async fn record_exit(&self, work: &WorkItem, step: &ProcessStep) -> Result<Transition>;

    /// Register a new work item and return it with its generated serial.
    async fn insert_work_item(
        &self,
        qr_code: &str,
        company: &str,
        manager: &str,
        step_ids: &[i32],
    ) -> Result<WorkItem>;

    /// Whether any work item with this source QR is still incomplete.
    async fn has_active_work(&self, qr_code: &str) -> Result<bool>;

    /// One page of work items, newest first, with the total count.
    async fn list_work_items(&self, limit: i64, offset: i64) -> Result<(i64, Vec<WorkItem>)>;

    /// Insert a new step definition and return it with its generated id.
    async fn insert_step(&self, def: &StepDefinition) -> Result<ProcessStep>;

    /// Update an existing step definition. Returns `false` when no
    /// non-archived step has that id.
    async fn update_step(&self, step_id: i32, def: &StepDefinition) -> Result<bool>;

    /// Whether a non-archived step other than `exclude` already posts this
    /// QR at either boundary.
    async fn qr_in_use(&self, qr: &str, exclude: Option<i32>) -> Result<bool>;

    /// One page of non-archived step definitions, oldest first, with the
    /// total count.
    async fn list_steps(&self, limit: i64, offset: i64) -> Result<(i64, Vec<ProcessStep>)>;

    /// Soft-delete a step definition. Returns `false` when no non-archived
    /// step has that id.
    async fn archive_step(&self, step_id: i32) -> Result<bool>;

    /// Whether any incomplete work item still has this step in its sequence.
    async fn step_in_use(&self, step_id: i32) -> Result<bool>;
}

/// Work item row as stored. Nullable descriptive columns collapse to empty
/// strings on the way into the domain.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkItemRecord {
    /// Serial identifier.
    pub serial: String,
    /// Source QR code.
    pub qr_code: String,
    /// Company name, nullable.
    pub company: Option<String>,
    /// Manager name, nullable.
    pub manager: Option<String>,
    /// Step sequence.
    pub step_ids: Vec<i32>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl WorkItemRecord {
    /// Convert into the domain model.
    pub fn into_work_item(self) -> WorkItem {
        WorkItem {
            serial: self.serial,
            qr_code: self.qr_code,
            company: self.company.unwrap_or_default(),
            manager: self.manager.unwrap_or_default(),
            step_ids: self.step_ids,
            created_at: self.created_at,
        }
    }
}

/// Process step row as stored. `params` is a jsonb object of string values.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessStepRecord {
    /// Step id.
    pub step_id: i32,
    /// Step name.
    pub name: String,
    /// Location label, nullable.
    pub location: Option<String>,
    /// Entry QR code.
    pub input_qr: String,
    /// Exit QR code.
    pub output_qr: String,
    /// Named parameters as jsonb.
    pub params: serde_json::Value,
    /// Soft-delete flag.
    pub archived: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Flatten a jsonb params object into string pairs. Non-string values are
/// kept as their JSON rendering rather than dropped.
fn params_map(value: &serde_json::Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .map(|(key, value)| {
                    let rendered = value
                        .as_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|| value.to_string());
                    (key.clone(), rendered)
                })
                .collect()
        })
        .unwrap_or_default()
}

impl ProcessStepRecord {
    /// Convert into the domain model.
    pub fn into_process_step(self) -> ProcessStep {
        let params = params_map(&self.params);

        ProcessStep {
            step_id: self.step_id,
            name: self.name,
            location: self.location.unwrap_or_default(),
            input_qr: self.input_qr,
            output_qr: self.output_qr,
            params,
            archived: self.archived,
            created_at: self.created_at,
        }
    }
}

/// Audit snapshot row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditSnapshotRecord {
    /// Snapshot id.
    pub id: i64,
    /// Work item serial.
    pub serial: String,
    /// Company at scan time, nullable.
    pub company: Option<String>,
    /// Manager at scan time, nullable.
    pub manager: Option<String>,
    /// Work item source QR at scan time.
    pub qr_code: String,
    /// Step sequence at scan time.
    pub step_ids: Vec<i32>,
    /// The step being worked.
    pub step_id: i32,
    /// Step name at scan time.
    pub step_name: String,
    /// Step location at scan time, nullable.
    pub step_location: Option<String>,
    /// Entry QR at scan time.
    pub input_qr: String,
    /// Exit QR, empty while the snapshot is open.
    pub output_qr: String,
    /// Step parameters at scan time, as jsonb.
    pub params: serde_json::Value,
    /// When the step was entered.
    pub entered_at: DateTime<Utc>,
    /// When the step was left, null while open.
    pub exited_at: Option<DateTime<Utc>>,
}

impl AuditSnapshotRecord {
    /// Convert into the domain model.
    pub fn into_audit_snapshot(self) -> AuditSnapshot {
        let params = params_map(&self.params);

        AuditSnapshot {
            id: self.id,
            serial: self.serial,
            company: self.company.unwrap_or_default(),
            manager: self.manager.unwrap_or_default(),
            qr_code: self.qr_code,
            step_ids: self.step_ids,
            step_id: self.step_id,
            step_name: self.step_name,
            step_location: self.step_location.unwrap_or_default(),
            input_qr: self.input_qr,
            output_qr: self.output_qr,
            params,
            entered_at: self.entered_at,
            exited_at: self.exited_at,
        }
    }
}

/// Transition row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TransitionRecord {
    /// Work item serial.
    pub serial: String,
    /// Step id.
    pub step_id: i32,
    /// Boundary code, 0 or 1.
    pub boundary: i32,
    /// Audit snapshot id.
    pub snapshot_id: i64,
    /// When the crossing was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Convert into the domain model, validating the boundary code.
    pub fn into_transition(self) -> Result<Transition> {
        let boundary =
            Boundary::from_wire(self.boundary).ok_or_else(|| CoreError::DatabaseError {
                operation: "decode transition".to_string(),
                details: format!(
                    "row for '{}' step {} has boundary {}",
                    self.serial, self.step_id, self.boundary
                ),
            })?;
        Ok(Transition {
            serial: self.serial,
            step_id: self.step_id,
            boundary,
            snapshot_id: self.snapshot_id,
            recorded_at: self.recorded_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn work_item_record_nulls_collapse_to_defaults() {
        let record = WorkItemRecord {
            serial: "W-000001".to_string(),
            qr_code: "ITEM-1".to_string(),
            company: None,
            manager: None,
            step_ids: vec![10, 20],
            created_at: Utc::now(),
        };
        let work = record.into_work_item();
        assert_eq!(work.company, "");
        assert_eq!(work.manager, "");
        assert_eq!(work.step_ids, vec![10, 20]);
    }

    #[test]
    fn step_record_params_keep_string_values() {
        let record = ProcessStepRecord {
            step_id: 10,
            name: "Paint".to_string(),
            location: None,
            input_qr: "IN-10".to_string(),
            output_qr: "OUT-10".to_string(),
            params: json!({"temp": "180C", "passes": 2}),
            archived: false,
            created_at: Utc::now(),
        };
        let step = record.into_process_step();
        assert_eq!(step.location, "");
        assert_eq!(step.params.get("temp").map(String::as_str), Some("180C"));
        assert_eq!(step.params.get("passes").map(String::as_str), Some("2"));
    }

    #[test]
    fn snapshot_record_nulls_collapse_to_defaults() {
        let record = AuditSnapshotRecord {
            id: 3,
            serial: "W-000001".to_string(),
            company: None,
            manager: None,
            qr_code: "ITEM-1".to_string(),
            step_ids: vec![10],
            step_id: 10,
            step_name: "Weld".to_string(),
            step_location: None,
            input_qr: "IN-10".to_string(),
            output_qr: String::new(),
            params: json!({"current": "90A"}),
            entered_at: Utc::now(),
            exited_at: None,
        };
        let snapshot = record.into_audit_snapshot();
        assert_eq!(snapshot.company, "");
        assert_eq!(snapshot.step_location, "");
        assert_eq!(snapshot.params.get("current").map(String::as_str), Some("90A"));
        assert!(snapshot.exited_at.is_none());
    }

    #[test]
    fn transition_record_rejects_unknown_boundary() {
        let record = TransitionRecord {
            serial: "W-000001".to_string(),
            step_id: 10,
            boundary: 7,
            snapshot_id: 1,
            recorded_at: Utc::now(),
        };
        assert!(matches!(
            record.into_transition(),
            Err(CoreError::DatabaseError { .. })
        ));

        let record = TransitionRecord {
            serial: "W-000001".to_string(),
            step_id: 10,
            boundary: 1,
            snapshot_id: 1,
            recorded_at: Utc::now(),
        };
        assert_eq!(
            record.into_transition().unwrap().boundary,
            Boundary::Exit
        );
    }
}
