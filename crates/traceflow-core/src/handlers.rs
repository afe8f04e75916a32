// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command handlers.
//!
//! Each handler takes a decoded request and produces the response the
//! dispatcher encodes back. Business outcomes travel in response codes;
//! only store and validation failures surface as errors.

use anyhow::Result;
use tracing::{info, instrument, warn};

use traceflow_protocol::messages::{
    NO_BOUNDARY, NO_STEP, NextActionMsg, PageRequest, ProcessStepArchiveOutcome,
    ProcessStepArchiveRequest, ProcessStepArchiveResponse, ProcessStepListResponse,
    ProcessStepMsg, ProcessStepUpsertOutcome, ProcessStepUpsertRequest,
    ProcessStepUpsertResponse, TransitionMsg, WorkItemGetRequest, WorkItemGetResponse,
    WorkItemInsertOutcome, WorkItemInsertRequest, WorkItemInsertResponse,
    WorkItemListResponse, WorkItemMsg, WorkflowAdvanceRequest, WorkflowAdvanceResponse,
    WorkflowOutcome,
};

use crate::domain::{AuditSnapshot, Boundary, ExpectedScan, ProcessStep, Transition, WorkItem};
use crate::engine::{Recognition, RecognitionEngine, StepHint};
use crate::error::CoreError;
use crate::persistence::{StepDefinition, Store};

fn work_item_msg(work: &WorkItem) -> WorkItemMsg {
    WorkItemMsg {
        serial: work.serial.clone(),
        qr_code: work.qr_code.clone(),
        company: work.company.clone(),
        manager: work.manager.clone(),
        step_ids: work.step_ids.clone(),
        created_at: work.created_at,
    }
}

fn step_msg(step: &ProcessStep) -> ProcessStepMsg {
    ProcessStepMsg {
        step_id: step.step_id,
        name: step.name.clone(),
        location: step.location.clone(),
        input_qr: step.input_qr.clone(),
        output_qr: step.output_qr.clone(),
        params: step.params.clone(),
        created_at: step.created_at,
    }
}

/// Render a step as it was captured at scan time. The snapshot's exit QR is
/// empty while the step is still open.
fn snapshot_step_msg(snapshot: &AuditSnapshot) -> ProcessStepMsg {
    ProcessStepMsg {
        step_id: snapshot.step_id,
        name: snapshot.step_name.clone(),
        location: snapshot.step_location.clone(),
        input_qr: snapshot.input_qr.clone(),
        output_qr: snapshot.output_qr.clone(),
        params: snapshot.params.clone(),
        created_at: snapshot.entered_at,
    }
}

fn transition_msg(transition: &Transition) -> TransitionMsg {
    TransitionMsg {
        serial: transition.serial.clone(),
        step_id: transition.step_id,
        boundary: transition.boundary.as_wire(),
        recorded_at: transition.recorded_at,
    }
}

fn next_action_msg(next: &ExpectedScan) -> NextActionMsg {
    NextActionMsg {
        step_id: next.step.step_id,
        boundary: next.boundary.as_wire(),
        step: step_msg(&next.step),
    }
}

/// Parse the optional step hint out of a workflow advance request.
fn parse_hint(request: &WorkflowAdvanceRequest) -> Result<Option<StepHint>, CoreError> {
    if request.step_id < 0 {
        return Ok(None);
    }
    let boundary =
        Boundary::from_wire(request.boundary).ok_or_else(|| CoreError::ValidationError {
            field: "boundary".to_string(),
            message: format!(
                "step hint {} needs boundary 0 or 1, got {}",
                request.step_id, request.boundary
            ),
        })?;
    Ok(Some(StepHint {
        step_id: request.step_id,
        boundary,
    }))
}

/// Interpret a scanned QR code and advance the matching work item.
#[instrument(skip(engine, request), fields(step_hint = request.step_id))]
pub async fn handle_workflow_advance(
    engine: &RecognitionEngine,
    request: &WorkflowAdvanceRequest,
) -> Result<WorkflowAdvanceResponse> {
    let hint = parse_hint(request)?;
    let recognition = engine.recognize(&request.code, hint).await?;

    let mut response = WorkflowAdvanceResponse::default();
    match recognition {
        Recognition::StepBoundary { step, boundary } => {
            response.outcome = WorkflowOutcome::StepRecognized;
            response.step = step_msg(&step);
            response.boundary = boundary.as_wire();
        }
        Recognition::WorkResolved { work, next } => {
            response.outcome = WorkflowOutcome::WorkAdvanced;
            response.work_item = work_item_msg(&work);
            response.next = next_action_msg(&next);
        }
        Recognition::WorkAdvanced {
            work,
            step,
            boundary,
            next,
        } => {
            info!(serial = %work.serial, step_id = step.step_id, ?boundary, "work item advanced");
            response.outcome = WorkflowOutcome::WorkAdvanced;
            response.work_item = work_item_msg(&work);
            response.step = step_msg(&step);
            response.next = next_action_msg(&next);
            response.boundary = boundary.as_wire();
        }
        Recognition::WorkCompleted { work } => {
            info!(serial = %work.serial, "work item complete");
            response.outcome = WorkflowOutcome::WorkCompleted;
            response.work_item = work_item_msg(&work);
            response.next = NextActionMsg {
                step_id: NO_STEP,
                boundary: NO_BOUNDARY,
                step: ProcessStepMsg::default(),
            };
        }
        Recognition::InvalidCode { work, next } => {
            warn!(serial = %work.serial, "scan rejected as invalid for work item");
            response.outcome = WorkflowOutcome::InvalidCode;
            response.work_item = work_item_msg(&work);
            response.next = next_action_msg(&next);
        }
        Recognition::NoProcessDefinition => {
            response.outcome = WorkflowOutcome::NoProcessDefinition;
        }
        Recognition::NoWorkContext => {
            response.outcome = WorkflowOutcome::NoWorkContext;
        }
    }
    Ok(response)
}

/// Register a new work item.
#[instrument(skip(store, request), fields(qr_code = %request.qr_code))]
pub async fn handle_work_item_insert(
    store: &dyn Store,
    request: &WorkItemInsertRequest,
) -> Result<WorkItemInsertResponse> {
    if request.qr_code.is_empty() {
        return Err(CoreError::ValidationError {
            field: "qr_code".to_string(),
            message: "must not be empty".to_string(),
        }
        .into());
    }
    if request.step_ids.is_empty() {
        return Err(CoreError::ValidationError {
            field: "step_ids".to_string(),
            message: "must not be empty".to_string(),
        }
        .into());
    }
    let known = store.steps_for(&request.step_ids).await?;
    if known.len() != request.step_ids.len() {
        return Err(CoreError::ValidationError {
            field: "step_ids".to_string(),
            message: "sequence references unknown steps".to_string(),
        }
        .into());
    }

    if store.has_active_work(&request.qr_code).await? {
        info!("registration refused, active work item shares the QR");
        return Ok(WorkItemInsertResponse {
            outcome: WorkItemInsertOutcome::ActiveWorkExists,
            ..Default::default()
        });
    }

    let work = store
        .insert_work_item(
            &request.qr_code,
            &request.company,
            &request.manager,
            &request.step_ids,
        )
        .await?;
    info!(serial = %work.serial, "work item registered");
    Ok(WorkItemInsertResponse {
        outcome: WorkItemInsertOutcome::Created,
        serial: work.serial,
        created_at: work.created_at,
    })
}

/// Fetch one work item with its step definitions and history.
///
/// Steps the item has already entered are served from their audit snapshot,
/// so renaming or re-coding a definition never rewrites recorded history;
/// the live definition fills in only for steps not yet scanned.
#[instrument(skip(store, request), fields(serial = %request.serial))]
pub async fn handle_work_item_get(
    store: &dyn Store,
    request: &WorkItemGetRequest,
) -> Result<WorkItemGetResponse> {
    let Some(work) = store.get_work_item(&request.serial).await? else {
        return Ok(WorkItemGetResponse::default());
    };
    let live = store.steps_for(&work.step_ids).await?;
    let snapshots = store.snapshots_for(&work.serial).await?;
    let transitions = store.list_transitions(&work.serial).await?;

    // Snapshots arrive newest first, so `find` picks the latest per step.
    let steps = work
        .step_ids
        .iter()
        .filter_map(|&id| {
            snapshots
                .iter()
                .find(|s| s.step_id == id)
                .map(snapshot_step_msg)
                .or_else(|| live.iter().find(|s| s.step_id == id).map(step_msg))
        })
        .collect();

    Ok(WorkItemGetResponse {
        found: true,
        work_item: work_item_msg(&work),
        steps,
        transitions: transitions.iter().map(transition_msg).collect(),
    })
}

/// Page through registered work items, newest first.
#[instrument(skip(store))]
pub async fn handle_work_item_list(
    store: &dyn Store,
    page_size: i64,
    request: &PageRequest,
) -> Result<WorkItemListResponse> {
    let page = i64::from(request.page.max(0));
    let (total, items) = store.list_work_items(page_size, page * page_size).await?;
    Ok(WorkItemListResponse {
        total: total as i32,
        items: items.iter().map(work_item_msg).collect(),
    })
}

/// Insert or update a process step definition.
#[instrument(skip(store, request), fields(step_id = request.step_id))]
pub async fn handle_process_step_upsert(
    store: &dyn Store,
    request: &ProcessStepUpsertRequest,
) -> Result<ProcessStepUpsertResponse> {
    for (field, value) in [
        ("name", &request.name),
        ("input_qr", &request.input_qr),
        ("output_qr", &request.output_qr),
    ] {
        if value.is_empty() {
            return Err(CoreError::ValidationError {
                field: field.to_string(),
                message: "must not be empty".to_string(),
            }
            .into());
        }
    }

    let rejected = |outcome| {
        Ok(ProcessStepUpsertResponse {
            outcome,
            step_id: NO_STEP,
        })
    };

    if request.input_qr == request.output_qr {
        return rejected(ProcessStepUpsertOutcome::DuplicateOutputQr);
    }
    let exclude = (request.step_id >= 0).then_some(request.step_id);
    if store.qr_in_use(&request.input_qr, exclude).await? {
        return rejected(ProcessStepUpsertOutcome::DuplicateInputQr);
    }
    if store.qr_in_use(&request.output_qr, exclude).await? {
        return rejected(ProcessStepUpsertOutcome::DuplicateOutputQr);
    }

    let def = StepDefinition {
        name: request.name.clone(),
        location: request.location.clone(),
        input_qr: request.input_qr.clone(),
        output_qr: request.output_qr.clone(),
        params: request.params.clone(),
    };

    if request.step_id >= 0 {
        if !store.update_step(request.step_id, &def).await? {
            return rejected(ProcessStepUpsertOutcome::NotFound);
        }
        info!(step_id = request.step_id, "process step updated");
        return Ok(ProcessStepUpsertResponse {
            outcome: ProcessStepUpsertOutcome::Saved,
            step_id: request.step_id,
        });
    }

    let step = store.insert_step(&def).await?;
    info!(step_id = step.step_id, "process step created");
    Ok(ProcessStepUpsertResponse {
        outcome: ProcessStepUpsertOutcome::Saved,
        step_id: step.step_id,
    })
}

/// Page through non-archived step definitions.
#[instrument(skip(store))]
pub async fn handle_process_step_list(
    store: &dyn Store,
    page_size: i64,
    request: &PageRequest,
) -> Result<ProcessStepListResponse> {
    let page = i64::from(request.page.max(0));
    let (total, steps) = store.list_steps(page_size, page * page_size).await?;
    Ok(ProcessStepListResponse {
        total: total as i32,
        steps: steps.iter().map(step_msg).collect(),
    })
}

/// Soft-delete a step definition that no incomplete work item references.
#[instrument(skip(store), fields(step_id = request.step_id))]
pub async fn handle_process_step_archive(
    store: &dyn Store,
    request: &ProcessStepArchiveRequest,
) -> Result<ProcessStepArchiveResponse> {
    let outcome = match store.get_step(request.step_id).await? {
        None => ProcessStepArchiveOutcome::NotFound,
        Some(step) if step.archived => ProcessStepArchiveOutcome::NotFound,
        Some(_) => {
            if store.step_in_use(request.step_id).await? {
                ProcessStepArchiveOutcome::StepInUse
            } else if store.archive_step(request.step_id).await? {
                info!(step_id = request.step_id, "process step archived");
                ProcessStepArchiveOutcome::Archived
            } else {
                ProcessStepArchiveOutcome::NotFound
            }
        }
    };
    Ok(ProcessStepArchiveResponse { outcome })
}
