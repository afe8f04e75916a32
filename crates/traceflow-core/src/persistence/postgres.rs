// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL implementation of the [`Store`] trait.
//!
//! Scan writes run in a transaction holding an advisory lock on the work
//! item's serial. The latest transition is re-read under that lock and
//! compared against what the engine saw; any drift aborts the write with
//! [`CoreError::Conflict`] so two concurrent scans can never both append.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::debug;

use crate::domain::{AuditSnapshot, Boundary, ExpectedLatest, ProcessStep, Transition, WorkItem};
use crate::error::{CoreError, Result};

use super::{
    AuditSnapshotRecord, ProcessStepRecord, StepDefinition, Store, TransitionRecord,
    WorkItemRecord,
};

const WORK_ITEM_COLUMNS: &str = "serial, qr_code, company, manager, step_ids, created_at";
const STEP_COLUMNS: &str =
    "step_id, name, location, input_qr, output_qr, params, archived, created_at";
const TRANSITION_COLUMNS: &str = "serial, step_id, boundary, snapshot_id, recorded_at";
const SNAPSHOT_COLUMNS: &str = "id, serial, company, manager, qr_code, step_ids, step_id, \
     step_name, step_location, input_qr, output_qr, params, entered_at, exited_at";

/// Latest transition for a serial; the id tiebreak keeps same-timestamp
/// rows in append order.
const LATEST_TRANSITION_SQL: &str = "SELECT serial, step_id, boundary, snapshot_id, recorded_at \
     FROM transitions WHERE serial = $1 \
     ORDER BY recorded_at DESC, id DESC LIMIT 1";

/// A work item is complete when its latest transition is the exit of the
/// last step in its sequence. `l` is the lateral latest-transition join.
const INCOMPLETE_PREDICATE: &str = "(l.step_id IS NULL \
     OR NOT (l.boundary = 1 AND l.step_id = w.step_ids[array_length(w.step_ids, 1)]))";

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    store_timeout: Duration,
}

impl PostgresStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, store_timeout: Duration) -> Self {
        Self {
            pool,
            store_timeout,
        }
    }

    /// Connect to the database and run pending migrations.
    pub async fn connect(database_url: &str, store_timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(16)
            .connect(database_url)
            .await?;
        crate::migrations::run(&pool).await?;
        Ok(Self::new(pool, store_timeout))
    }

    /// Run a store operation under the configured deadline.
    async fn timed<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(operation, timeout_ms = self.store_timeout.as_millis() as u64, "store operation timed out");
                Err(CoreError::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn find_step_by_qr(&self, code: &str) -> Result<Option<ProcessStep>> {
        self.timed("find_step_by_qr", async {
            let record = sqlx::query_as::<_, ProcessStepRecord>(&format!(
                "SELECT {STEP_COLUMNS} FROM process_steps \
                 WHERE NOT archived AND (input_qr = $1 OR output_qr = $1)"
            ))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record.map(ProcessStepRecord::into_process_step))
        })
        .await
    }

    async fn get_step(&self, step_id: i32) -> Result<Option<ProcessStep>> {
        self.timed("get_step", async {
            let record = sqlx::query_as::<_, ProcessStepRecord>(&format!(
                "SELECT {STEP_COLUMNS} FROM process_steps WHERE step_id = $1"
            ))
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record.map(ProcessStepRecord::into_process_step))
        })
        .await
    }

    async fn steps_for(&self, step_ids: &[i32]) -> Result<Vec<ProcessStep>> {
        self.timed("steps_for", async {
            let records = sqlx::query_as::<_, ProcessStepRecord>(
                "SELECT p.step_id, p.name, p.location, p.input_qr, p.output_qr, \
                        p.params, p.archived, p.created_at \
                 FROM unnest($1::int4[]) WITH ORDINALITY AS ids(step_id, ord) \
                 JOIN process_steps p ON p.step_id = ids.step_id \
                 ORDER BY ids.ord",
            )
            .bind(step_ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(records
                .into_iter()
                .map(ProcessStepRecord::into_process_step)
                .collect())
        })
        .await
    }

    async fn find_work_item_by_qr(&self, code: &str) -> Result<Option<WorkItem>> {
        self.timed("find_work_item_by_qr", async {
            // In progress beats not started beats completed; newest
            // registration wins within a bucket.
            let record = sqlx::query_as::<_, WorkItemRecord>(&format!(
                "SELECT w.serial, w.qr_code, w.company, w.manager, w.step_ids, w.created_at \
                 FROM work_items w \
                 LEFT JOIN LATERAL ( \
                     SELECT t.step_id, t.boundary FROM transitions t \
                     WHERE t.serial = w.serial \
                     ORDER BY t.recorded_at DESC, t.id DESC LIMIT 1 \
                 ) l ON TRUE \
                 WHERE w.qr_code = $1 \
                 ORDER BY \
                     CASE \
                         WHEN l.step_id IS NULL THEN 1 \
                         WHEN l.boundary = 1 \
                              AND l.step_id = w.step_ids[array_length(w.step_ids, 1)] THEN 2 \
                         ELSE 0 \
                     END, \
                     w.created_at DESC \
                 LIMIT 1"
            ))
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record.map(WorkItemRecord::into_work_item))
        })
        .await
    }

    async fn get_work_item(&self, serial: &str) -> Result<Option<WorkItem>> {
        self.timed("get_work_item", async {
            let record = sqlx::query_as::<_, WorkItemRecord>(&format!(
                "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE serial = $1"
            ))
            .bind(serial)
            .fetch_optional(&self.pool)
            .await?;
            Ok(record.map(WorkItemRecord::into_work_item))
        })
        .await
    }

    async fn latest_transition(&self, serial: &str) -> Result<Option<Transition>> {
        self.timed("latest_transition", async {
            let record = sqlx::query_as::<_, TransitionRecord>(LATEST_TRANSITION_SQL)
                .bind(serial)
                .fetch_optional(&self.pool)
                .await?;
            record.map(TransitionRecord::into_transition).transpose()
        })
        .await
    }

    async fn list_transitions(&self, serial: &str) -> Result<Vec<Transition>> {
        self.timed("list_transitions", async {
            let records = sqlx::query_as::<_, TransitionRecord>(&format!(
                "SELECT {TRANSITION_COLUMNS} FROM transitions WHERE serial = $1 \
                 ORDER BY recorded_at DESC, id DESC"
            ))
            .bind(serial)
            .fetch_all(&self.pool)
            .await?;
            records
                .into_iter()
                .map(TransitionRecord::into_transition)
                .collect()
        })
        .await
    }

    async fn snapshots_for(&self, serial: &str) -> Result<Vec<AuditSnapshot>> {
        self.timed("snapshots_for", async {
            let records = sqlx::query_as::<_, AuditSnapshotRecord>(&format!(
                "SELECT {SNAPSHOT_COLUMNS} FROM audit_snapshots WHERE serial = $1 \
                 ORDER BY entered_at DESC, id DESC"
            ))
            .bind(serial)
            .fetch_all(&self.pool)
            .await?;
            Ok(records
                .into_iter()
                .map(AuditSnapshotRecord::into_audit_snapshot)
                .collect())
        })
        .await
    }

    async fn record_entry(
        &self,
        work: &WorkItem,
        step: &ProcessStep,
        expected: ExpectedLatest,
    ) -> Result<Transition> {
        self.timed("record_entry", async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&work.serial)
                .execute(&mut *tx)
                .await?;

            let latest = sqlx::query_as::<_, TransitionRecord>(LATEST_TRANSITION_SQL)
                .bind(&work.serial)
                .fetch_optional(&mut *tx)
                .await?
                .map(TransitionRecord::into_transition)
                .transpose()?;
            if !expected.matches(latest.as_ref()) {
                return Err(CoreError::Conflict {
                    serial: work.serial.clone(),
                });
            }

            let params = serde_json::to_value(&step.params)?;
            let snapshot_id: i64 = sqlx::query_scalar(
                "INSERT INTO audit_snapshots \
                 (serial, company, manager, qr_code, step_ids, step_id, step_name, \
                  step_location, input_qr, params) \
                 VALUES ($1, NULLIF($2, ''), NULLIF($3, ''), $4, $5, $6, $7, \
                         NULLIF($8, ''), $9, $10) \
                 RETURNING id",
            )
            .bind(&work.serial)
            .bind(&work.company)
            .bind(&work.manager)
            .bind(&work.qr_code)
            .bind(&work.step_ids)
            .bind(step.step_id)
            .bind(&step.name)
            .bind(&step.location)
            .bind(&step.input_qr)
            .bind(&params)
            .fetch_one(&mut *tx)
            .await?;

            let record = sqlx::query_as::<_, TransitionRecord>(&format!(
                "INSERT INTO transitions (serial, step_id, boundary, snapshot_id) \
                 VALUES ($1, $2, $3, $4) RETURNING {TRANSITION_COLUMNS}"
            ))
            .bind(&work.serial)
            .bind(step.step_id)
            .bind(Boundary::Entry.as_wire())
            .bind(snapshot_id)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            debug!(serial = %work.serial, step_id = step.step_id, "recorded step entry");
            record.into_transition()
        })
        .await
    }

    async fn record_exit(&self, work: &WorkItem, step: &ProcessStep) -> Result<Transition> {
        self.timed("record_exit", async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(&work.serial)
                .execute(&mut *tx)
                .await?;

            let latest = sqlx::query_as::<_, TransitionRecord>(LATEST_TRANSITION_SQL)
                .bind(&work.serial)
                .fetch_optional(&mut *tx)
                .await?
                .map(TransitionRecord::into_transition)
                .transpose()?;
            let snapshot_id = match latest {
                Some(ref t)
                    if ExpectedLatest::EntryOf(step.step_id).matches(Some(t)) =>
                {
                    t.snapshot_id
                }
                _ => {
                    return Err(CoreError::Conflict {
                        serial: work.serial.clone(),
                    });
                }
            };

            let record = sqlx::query_as::<_, TransitionRecord>(&format!(
                "INSERT INTO transitions (serial, step_id, boundary, snapshot_id) \
                 VALUES ($1, $2, $3, $4) RETURNING {TRANSITION_COLUMNS}"
            ))
            .bind(&work.serial)
            .bind(step.step_id)
            .bind(Boundary::Exit.as_wire())
            .bind(snapshot_id)
            .fetch_one(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE audit_snapshots SET exited_at = NOW(), output_qr = $2 WHERE id = $1",
            )
            .bind(snapshot_id)
            .bind(&step.output_qr)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            debug!(serial = %work.serial, step_id = step.step_id, "recorded step exit");
            record.into_transition()
        })
        .await
    }

    async fn insert_work_item(
        &self,
        qr_code: &str,
        company: &str,
        manager: &str,
        step_ids: &[i32],
    ) -> Result<WorkItem> {
        self.timed("insert_work_item", async {
            let record = sqlx::query_as::<_, WorkItemRecord>(&format!(
                "INSERT INTO work_items (qr_code, company, manager, step_ids) \
                 VALUES ($1, NULLIF($2, ''), NULLIF($3, ''), $4) \
                 RETURNING {WORK_ITEM_COLUMNS}"
            ))
            .bind(qr_code)
            .bind(company)
            .bind(manager)
            .bind(step_ids)
            .fetch_one(&self.pool)
            .await?;
            Ok(record.into_work_item())
        })
        .await
    }

    async fn has_active_work(&self, qr_code: &str) -> Result<bool> {
        self.timed("has_active_work", async {
            let exists: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS ( \
                     SELECT 1 FROM work_items w \
                     LEFT JOIN LATERAL ( \
                         SELECT t.step_id, t.boundary FROM transitions t \
                         WHERE t.serial = w.serial \
                         ORDER BY t.recorded_at DESC, t.id DESC LIMIT 1 \
                     ) l ON TRUE \
                     WHERE w.qr_code = $1 AND {INCOMPLETE_PREDICATE} \
                 )"
            ))
            .bind(qr_code)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
        .await
    }

    async fn list_work_items(&self, limit: i64, offset: i64) -> Result<(i64, Vec<WorkItem>)> {
        self.timed("list_work_items", async {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM work_items")
                .fetch_one(&self.pool)
                .await?;
            let records = sqlx::query_as::<_, WorkItemRecord>(&format!(
                "SELECT {WORK_ITEM_COLUMNS} FROM work_items \
                 ORDER BY created_at DESC, serial DESC LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok((
                total,
                records
                    .into_iter()
                    .map(WorkItemRecord::into_work_item)
                    .collect(),
            ))
        })
        .await
    }

    async fn insert_step(&self, def: &StepDefinition) -> Result<ProcessStep> {
        self.timed("insert_step", async {
            let params = serde_json::to_value(&def.params)?;
            let record = sqlx::query_as::<_, ProcessStepRecord>(&format!(
                "INSERT INTO process_steps (name, location, input_qr, output_qr, params) \
                 VALUES ($1, NULLIF($2, ''), $3, $4, $5) \
                 RETURNING {STEP_COLUMNS}"
            ))
            .bind(&def.name)
            .bind(&def.location)
            .bind(&def.input_qr)
            .bind(&def.output_qr)
            .bind(&params)
            .fetch_one(&self.pool)
            .await?;
            Ok(record.into_process_step())
        })
        .await
    }

    async fn update_step(&self, step_id: i32, def: &StepDefinition) -> Result<bool> {
        self.timed("update_step", async {
            let params = serde_json::to_value(&def.params)?;
            let result = sqlx::query(
                "UPDATE process_steps \
                 SET name = $2, location = NULLIF($3, ''), input_qr = $4, \
                     output_qr = $5, params = $6 \
                 WHERE step_id = $1 AND NOT archived",
            )
            .bind(step_id)
            .bind(&def.name)
            .bind(&def.location)
            .bind(&def.input_qr)
            .bind(&def.output_qr)
            .bind(&params)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn qr_in_use(&self, qr: &str, exclude: Option<i32>) -> Result<bool> {
        self.timed("qr_in_use", async {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS ( \
                     SELECT 1 FROM process_steps \
                     WHERE NOT archived \
                       AND (input_qr = $1 OR output_qr = $1) \
                       AND ($2::int4 IS NULL OR step_id <> $2) \
                 )",
            )
            .bind(qr)
            .bind(exclude)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
        .await
    }

    async fn list_steps(&self, limit: i64, offset: i64) -> Result<(i64, Vec<ProcessStep>)> {
        self.timed("list_steps", async {
            let total: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM process_steps WHERE NOT archived")
                    .fetch_one(&self.pool)
                    .await?;
            let records = sqlx::query_as::<_, ProcessStepRecord>(&format!(
                "SELECT {STEP_COLUMNS} FROM process_steps WHERE NOT archived \
                 ORDER BY step_id LIMIT $1 OFFSET $2"
            ))
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok((
                total,
                records
                    .into_iter()
                    .map(ProcessStepRecord::into_process_step)
                    .collect(),
            ))
        })
        .await
    }

    async fn archive_step(&self, step_id: i32) -> Result<bool> {
        self.timed("archive_step", async {
            let result =
                sqlx::query("UPDATE process_steps SET archived = TRUE WHERE step_id = $1 AND NOT archived")
                    .bind(step_id)
                    .execute(&self.pool)
                    .await?;
            Ok(result.rows_affected() == 1)
        })
        .await
    }

    async fn step_in_use(&self, step_id: i32) -> Result<bool> {
        self.timed("step_in_use", async {
            let exists: bool = sqlx::query_scalar(&format!(
                "SELECT EXISTS ( \
                     SELECT 1 FROM work_items w \
                     LEFT JOIN LATERAL ( \
                         SELECT t.step_id, t.boundary FROM transitions t \
                         WHERE t.serial = w.serial \
                         ORDER BY t.recorded_at DESC, t.id DESC LIMIT 1 \
                     ) l ON TRUE \
                     WHERE $1 = ANY (w.step_ids) AND {INCOMPLETE_PREDICATE} \
                 )"
            ))
            .bind(step_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(exists)
        })
        .await
    }
}
