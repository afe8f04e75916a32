// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory [`Store`] double shared by the integration tests.

// Not every test binary touches every helper.
#![allow(dead_code)]

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, Once};

use async_trait::async_trait;
use chrono::Utc;

use traceflow_core::domain::{
    AuditSnapshot, Boundary, ExpectedLatest, ProcessStep, Transition, WorkItem,
};
use traceflow_core::error::{CoreError, Result};
use traceflow_core::persistence::{StepDefinition, Store};

#[derive(Default)]
struct Inner {
    steps: Vec<ProcessStep>,
    items: Vec<WorkItem>,
    transitions: Vec<Transition>,
    snapshots: Vec<AuditSnapshot>,
    next_step_id: i32,
    next_serial: i64,
    next_snapshot_id: i64,
    poisoned: bool,
}

/// In-memory store with the same observable semantics as the PostgreSQL
/// implementation. Transitions live in append order; "latest" is the tail.
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`, once per binary.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

impl MemStore {
    pub fn new() -> Self {
        init_tracing();
        Self::default()
    }

    /// Make every subsequent store call fail, for failure-path tests.
    pub fn poison(&self) {
        self.inner.lock().unwrap().poisoned = true;
    }

    /// Seed a step definition and return it.
    pub fn seed_step(&self, name: &str, input_qr: &str, output_qr: &str) -> ProcessStep {
        let mut inner = self.inner.lock().unwrap();
        inner.next_step_id += 1;
        let step = ProcessStep {
            step_id: inner.next_step_id,
            name: name.to_string(),
            location: String::new(),
            input_qr: input_qr.to_string(),
            output_qr: output_qr.to_string(),
            params: BTreeMap::new(),
            archived: false,
            created_at: Utc::now(),
        };
        inner.steps.push(step.clone());
        step
    }

    /// Seed a work item and return it.
    pub fn seed_work_item(&self, qr_code: &str, step_ids: &[i32]) -> WorkItem {
        let mut inner = self.inner.lock().unwrap();
        inner.next_serial += 1;
        let work = WorkItem {
            serial: format!("W-{:06}", inner.next_serial),
            qr_code: qr_code.to_string(),
            company: "Acme".to_string(),
            manager: "Kim".to_string(),
            step_ids: step_ids.to_vec(),
            created_at: Utc::now(),
        };
        inner.items.push(work.clone());
        work
    }

    /// Append a transition without the usual precondition checks, for
    /// corrupt-history tests.
    pub fn inject_transition(&self, serial: &str, step_id: i32, boundary: Boundary) {
        let mut inner = self.inner.lock().unwrap();
        inner.next_snapshot_id += 1;
        let snapshot_id = inner.next_snapshot_id;
        inner.transitions.push(Transition {
            serial: serial.to_string(),
            step_id,
            boundary,
            snapshot_id,
            recorded_at: Utc::now(),
        });
    }

    /// All transitions in append order.
    pub fn transitions(&self) -> Vec<Transition> {
        self.inner.lock().unwrap().transitions.clone()
    }

    /// All audit snapshots in creation order.
    pub fn snapshots(&self) -> Vec<AuditSnapshot> {
        self.inner.lock().unwrap().snapshots.clone()
    }

    fn guard(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self.inner.lock().unwrap();
        if inner.poisoned {
            return Err(CoreError::DatabaseError {
                operation: "query".to_string(),
                details: "store poisoned by test".to_string(),
            });
        }
        Ok(inner)
    }
}

fn latest_of<'a>(inner: &'a Inner, serial: &str) -> Option<&'a Transition> {
    inner.transitions.iter().rev().find(|t| t.serial == serial)
}

fn is_complete(inner: &Inner, work: &WorkItem) -> bool {
    match latest_of(inner, &work.serial) {
        Some(t) => t.boundary == Boundary::Exit && Some(t.step_id) == work.last_step(),
        None => false,
    }
}

#[async_trait]
impl Store for MemStore {
    async fn find_step_by_qr(&self, code: &str) -> Result<Option<ProcessStep>> {
        let inner = self.guard()?;
        Ok(inner
            .steps
            .iter()
            .find(|s| !s.archived && (s.input_qr == code || s.output_qr == code))
            .cloned())
    }

    async fn get_step(&self, step_id: i32) -> Result<Option<ProcessStep>> {
        let inner = self.guard()?;
        Ok(inner.steps.iter().find(|s| s.step_id == step_id).cloned())
    }

    async fn steps_for(&self, step_ids: &[i32]) -> Result<Vec<ProcessStep>> {
        let inner = self.guard()?;
        Ok(step_ids
            .iter()
            .filter_map(|id| inner.steps.iter().find(|s| s.step_id == *id).cloned())
            .collect())
    }

    async fn find_work_item_by_qr(&self, code: &str) -> Result<Option<WorkItem>> {
        let inner = self.guard()?;
        // In progress beats not started beats completed; ties go to the
        // most recently registered (reverse insertion order).
        Ok(inner
            .items
            .iter()
            .rev()
            .filter(|w| w.qr_code == code)
            .min_by_key(|w| {
                let rank = match latest_of(&inner, &w.serial) {
                    None => 1,
                    Some(_) if is_complete(&inner, w) => 2,
                    Some(_) => 0,
                };
                (rank, Reverse(w.created_at))
            })
            .cloned())
    }

    async fn get_work_item(&self, serial: &str) -> Result<Option<WorkItem>> {
        let inner = self.guard()?;
        Ok(inner.items.iter().find(|w| w.serial == serial).cloned())
    }

    async fn latest_transition(&self, serial: &str) -> Result<Option<Transition>> {
        let inner = self.guard()?;
        Ok(latest_of(&inner, serial).cloned())
    }

    async fn list_transitions(&self, serial: &str) -> Result<Vec<Transition>> {
        let inner = self.guard()?;
        let mut transitions: Vec<Transition> = inner
            .transitions
            .iter()
            .filter(|t| t.serial == serial)
            .cloned()
            .collect();
        transitions.reverse();
        Ok(transitions)
    }

    async fn snapshots_for(&self, serial: &str) -> Result<Vec<AuditSnapshot>> {
        let inner = self.guard()?;
        let mut snapshots: Vec<AuditSnapshot> = inner
            .snapshots
            .iter()
            .filter(|s| s.serial == serial)
            .cloned()
            .collect();
        snapshots.reverse();
        Ok(snapshots)
    }

    async fn record_entry(
        &self,
        work: &WorkItem,
        step: &ProcessStep,
        expected: ExpectedLatest,
    ) -> Result<Transition> {
        let mut inner = self.guard()?;
        if !expected.matches(latest_of(&inner, &work.serial)) {
            return Err(CoreError::Conflict {
                serial: work.serial.clone(),
            });
        }
        inner.next_snapshot_id += 1;
        let snapshot_id = inner.next_snapshot_id;
        inner.snapshots.push(AuditSnapshot {
            id: snapshot_id,
            serial: work.serial.clone(),
            company: work.company.clone(),
            manager: work.manager.clone(),
            qr_code: work.qr_code.clone(),
            step_ids: work.step_ids.clone(),
            step_id: step.step_id,
            step_name: step.name.clone(),
            step_location: step.location.clone(),
            input_qr: step.input_qr.clone(),
            output_qr: String::new(),
            params: step.params.clone(),
            entered_at: Utc::now(),
            exited_at: None,
        });
        let transition = Transition {
            serial: work.serial.clone(),
            step_id: step.step_id,
            boundary: Boundary::Entry,
            snapshot_id,
            recorded_at: Utc::now(),
        };
        inner.transitions.push(transition.clone());
        Ok(transition)
    }

    async fn record_exit(&self, work: &WorkItem, step: &ProcessStep) -> Result<Transition> {
        let mut inner = self.guard()?;
        let snapshot_id = match latest_of(&inner, &work.serial) {
            Some(t) if ExpectedLatest::EntryOf(step.step_id).matches(Some(t)) => t.snapshot_id,
            _ => {
                return Err(CoreError::Conflict {
                    serial: work.serial.clone(),
                });
            }
        };
        let transition = Transition {
            serial: work.serial.clone(),
            step_id: step.step_id,
            boundary: Boundary::Exit,
            snapshot_id,
            recorded_at: Utc::now(),
        };
        inner.transitions.push(transition.clone());
        if let Some(snapshot) = inner.snapshots.iter_mut().find(|s| s.id == snapshot_id) {
            snapshot.exited_at = Some(Utc::now());
            snapshot.output_qr = step.output_qr.clone();
        }
        Ok(transition)
    }

    async fn insert_work_item(
        &self,
        qr_code: &str,
        company: &str,
        manager: &str,
        step_ids: &[i32],
    ) -> Result<WorkItem> {
        let mut inner = self.guard()?;
        inner.next_serial += 1;
        let work = WorkItem {
            serial: format!("W-{:06}", inner.next_serial),
            qr_code: qr_code.to_string(),
            company: company.to_string(),
            manager: manager.to_string(),
            step_ids: step_ids.to_vec(),
            created_at: Utc::now(),
        };
        inner.items.push(work.clone());
        Ok(work)
    }

    async fn has_active_work(&self, qr_code: &str) -> Result<bool> {
        let inner = self.guard()?;
        Ok(inner
            .items
            .iter()
            .any(|w| w.qr_code == qr_code && !is_complete(&inner, w)))
    }

    async fn list_work_items(&self, limit: i64, offset: i64) -> Result<(i64, Vec<WorkItem>)> {
        let inner = self.guard()?;
        let total = inner.items.len() as i64;
        let items = inner
            .items
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((total, items))
    }

    async fn insert_step(&self, def: &StepDefinition) -> Result<ProcessStep> {
        let mut inner = self.guard()?;
        inner.next_step_id += 1;
        let step = ProcessStep {
            step_id: inner.next_step_id,
            name: def.name.clone(),
            location: def.location.clone(),
            input_qr: def.input_qr.clone(),
            output_qr: def.output_qr.clone(),
            params: def.params.clone(),
            archived: false,
            created_at: Utc::now(),
        };
        inner.steps.push(step.clone());
        Ok(step)
    }

    async fn update_step(&self, step_id: i32, def: &StepDefinition) -> Result<bool> {
        let mut inner = self.guard()?;
        match inner
            .steps
            .iter_mut()
            .find(|s| s.step_id == step_id && !s.archived)
        {
            Some(step) => {
                step.name = def.name.clone();
                step.location = def.location.clone();
                step.input_qr = def.input_qr.clone();
                step.output_qr = def.output_qr.clone();
                step.params = def.params.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn qr_in_use(&self, qr: &str, exclude: Option<i32>) -> Result<bool> {
        let inner = self.guard()?;
        Ok(inner.steps.iter().any(|s| {
            !s.archived
                && Some(s.step_id) != exclude
                && (s.input_qr == qr || s.output_qr == qr)
        }))
    }

    async fn list_steps(&self, limit: i64, offset: i64) -> Result<(i64, Vec<ProcessStep>)> {
        let inner = self.guard()?;
        let mut live: Vec<ProcessStep> =
            inner.steps.iter().filter(|s| !s.archived).cloned().collect();
        live.sort_by_key(|s| s.step_id);
        let total = live.len() as i64;
        let steps = live
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((total, steps))
    }

    async fn archive_step(&self, step_id: i32) -> Result<bool> {
        let mut inner = self.guard()?;
        match inner
            .steps
            .iter_mut()
            .find(|s| s.step_id == step_id && !s.archived)
        {
            Some(step) => {
                step.archived = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn step_in_use(&self, step_id: i32) -> Result<bool> {
        let inner = self.guard()?;
        Ok(inner
            .items
            .iter()
            .any(|w| w.step_ids.contains(&step_id) && !is_complete(&inner, w)))
    }
}
