// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request/response message types for every command.
//!
//! Each message encodes its fields positionally, in the order they are
//! declared here. Shared records ([`WorkItemMsg`], [`ProcessStepMsg`],
//! [`TransitionMsg`], [`NextActionMsg`]) are always present in their parent
//! message, with zero/empty defaults standing in for "no value" so the wire
//! layout never branches.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::command::{Command, CommandId};
use crate::wire::{WireDecode, WireEncode, WireError, WireReader, WireWriter};

/// Step id value meaning "no step".
pub const NO_STEP: i32 = -1;
/// Boundary value meaning "no boundary".
pub const NO_BOUNDARY: i32 = -1;
/// Boundary value for scanning a step's input QR (step entry).
pub const BOUNDARY_ENTRY: i32 = 0;
/// Boundary value for scanning a step's output QR (step exit).
pub const BOUNDARY_EXIT: i32 = 1;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl WireEncode for () {
    fn encode(&self, _w: &mut WireWriter) -> Result<(), WireError> {
        Ok(())
    }
}

impl WireDecode for () {
    fn decode(_r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(())
    }
}

// ============================================================================
// Shared records
// ============================================================================

/// A work item on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemMsg {
    /// Store-assigned serial identifier; empty when no work item is resolved.
    pub serial: String,
    /// Source QR code scanned to identify this work item.
    pub qr_code: String,
    /// Company name.
    pub company: String,
    /// Manager name.
    pub manager: String,
    /// Required step execution order, fixed at creation.
    pub step_ids: Vec<i32>,
    /// When the work item was registered.
    pub created_at: DateTime<Utc>,
}

impl Default for WorkItemMsg {
    fn default() -> Self {
        Self {
            serial: String::new(),
            qr_code: String::new(),
            company: String::new(),
            manager: String::new(),
            step_ids: Vec::new(),
            created_at: epoch(),
        }
    }
}

impl WireEncode for WorkItemMsg {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.serial)?;
        w.put_str(&self.qr_code)?;
        w.put_str(&self.company)?;
        w.put_str(&self.manager)?;
        w.put_i32_list(&self.step_ids)?;
        w.put_timestamp(self.created_at)
    }
}

impl WireDecode for WorkItemMsg {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            serial: r.get_str()?,
            qr_code: r.get_str()?,
            company: r.get_str()?,
            manager: r.get_str()?,
            step_ids: r.get_i32_list()?,
            created_at: r.get_timestamp()?,
        })
    }
}

/// A process step definition on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStepMsg {
    /// Step identifier; [`NO_STEP`] when no step is resolved.
    pub step_id: i32,
    /// Human-readable step name.
    pub name: String,
    /// Location label.
    pub location: String,
    /// QR code scanned on step entry.
    pub input_qr: String,
    /// QR code scanned on step exit.
    pub output_qr: String,
    /// Open set of named parameters.
    pub params: BTreeMap<String, String>,
    /// When the step definition was created.
    pub created_at: DateTime<Utc>,
}

impl Default for ProcessStepMsg {
    fn default() -> Self {
        Self {
            step_id: NO_STEP,
            name: String::new(),
            location: String::new(),
            input_qr: String::new(),
            output_qr: String::new(),
            params: BTreeMap::new(),
            created_at: epoch(),
        }
    }
}

impl WireEncode for ProcessStepMsg {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.step_id)?;
        w.put_str(&self.name)?;
        w.put_str(&self.location)?;
        w.put_str(&self.input_qr)?;
        w.put_str(&self.output_qr)?;
        w.put_map(&self.params)?;
        w.put_timestamp(self.created_at)
    }
}

impl WireDecode for ProcessStepMsg {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            step_id: r.get_i32()?,
            name: r.get_str()?,
            location: r.get_str()?,
            input_qr: r.get_str()?,
            output_qr: r.get_str()?,
            params: r.get_map()?,
            created_at: r.get_timestamp()?,
        })
    }
}

/// One recorded recognition event on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMsg {
    /// Work item serial.
    pub serial: String,
    /// Step the transition belongs to.
    pub step_id: i32,
    /// [`BOUNDARY_ENTRY`] or [`BOUNDARY_EXIT`].
    pub boundary: i32,
    /// When the transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Default for TransitionMsg {
    fn default() -> Self {
        Self {
            serial: String::new(),
            step_id: NO_STEP,
            boundary: NO_BOUNDARY,
            recorded_at: epoch(),
        }
    }
}

impl WireEncode for TransitionMsg {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.serial)?;
        w.put_i32(self.step_id)?;
        w.put_i32(self.boundary)?;
        w.put_timestamp(self.recorded_at)
    }
}

impl WireDecode for TransitionMsg {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            serial: r.get_str()?,
            step_id: r.get_i32()?,
            boundary: r.get_i32()?,
            recorded_at: r.get_timestamp()?,
        })
    }
}

/// The next expected scan for a work item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NextActionMsg {
    /// Step the next scan belongs to; [`NO_STEP`] when the sequence is done.
    pub step_id: i32,
    /// Expected boundary; [`NO_BOUNDARY`] when the sequence is done.
    pub boundary: i32,
    /// Detail of the expected step; defaults when the sequence is done.
    pub step: ProcessStepMsg,
}

impl WireEncode for NextActionMsg {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.step_id)?;
        w.put_i32(self.boundary)?;
        self.step.encode(w)
    }
}

impl WireDecode for NextActionMsg {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            step_id: r.get_i32()?,
            boundary: r.get_i32()?,
            step: ProcessStepMsg::decode(r)?,
        })
    }
}

// ============================================================================
// WORKFLOW_ADVANCE
// ============================================================================

/// Recognition outcome carried in [`WorkflowAdvanceResponse`].
///
/// Callers must branch on this code; success is never inferred from the
/// absence of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum WorkflowOutcome {
    /// The scan advanced a work item; a transition was recorded.
    WorkAdvanced = 0,
    /// The code matched a step's input or output QR with no work context.
    StepRecognized = 1,
    /// The scan closed the last step; the work item is complete.
    WorkCompleted = 2,
    /// Work context is known but the code matches no expected boundary.
    InvalidCode = 3,
    /// The code matches neither a step boundary nor any work item.
    NoProcessDefinition = 4,
    /// An explicit step hint was supplied but no work item resolved.
    NoWorkContext = 5,
}

impl TryFrom<i32> for WorkflowOutcome {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::WorkAdvanced),
            1 => Ok(Self::StepRecognized),
            2 => Ok(Self::WorkCompleted),
            3 => Ok(Self::InvalidCode),
            4 => Ok(Self::NoProcessDefinition),
            5 => Ok(Self::NoWorkContext),
            other => Err(WireError::UnknownOutcome(other)),
        }
    }
}

/// Marker for the `WORKFLOW_ADVANCE` command.
pub struct WorkflowAdvance;

impl Command for WorkflowAdvance {
    const ID: CommandId = CommandId::WorkflowAdvance;
    type Request = WorkflowAdvanceRequest;
    type Response = WorkflowAdvanceResponse;
}

/// Request for `WORKFLOW_ADVANCE`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAdvanceRequest {
    /// The scanned QR code.
    pub code: String,
    /// Explicit step hint, [`NO_STEP`] for code-only recognition.
    pub step_id: i32,
    /// Explicit boundary hint, [`NO_BOUNDARY`] for code-only recognition.
    pub boundary: i32,
}

impl Default for WorkflowAdvanceRequest {
    fn default() -> Self {
        Self {
            code: String::new(),
            step_id: NO_STEP,
            boundary: NO_BOUNDARY,
        }
    }
}

impl WireEncode for WorkflowAdvanceRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.code)?;
        w.put_i32(self.step_id)?;
        w.put_i32(self.boundary)
    }
}

impl WireDecode for WorkflowAdvanceRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            code: r.get_str()?,
            step_id: r.get_i32()?,
            boundary: r.get_i32()?,
        })
    }
}

/// Response for `WORKFLOW_ADVANCE`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowAdvanceResponse {
    /// Recognition outcome code.
    pub outcome: WorkflowOutcome,
    /// Resolved work item, defaults when none.
    pub work_item: WorkItemMsg,
    /// Resolved process step for a bare boundary recognition, defaults otherwise.
    pub step: ProcessStepMsg,
    /// The computed next expected scan.
    pub next: NextActionMsg,
    /// Boundary echo: which boundary the scanned code matched.
    pub boundary: i32,
}

impl Default for WorkflowAdvanceResponse {
    fn default() -> Self {
        Self {
            outcome: WorkflowOutcome::InvalidCode,
            work_item: WorkItemMsg::default(),
            step: ProcessStepMsg::default(),
            next: NextActionMsg::default(),
            boundary: NO_BOUNDARY,
        }
    }
}

impl WireEncode for WorkflowAdvanceResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.outcome as i32)?;
        self.work_item.encode(w)?;
        self.step.encode(w)?;
        self.next.encode(w)?;
        w.put_i32(self.boundary)
    }
}

impl WireDecode for WorkflowAdvanceResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            outcome: WorkflowOutcome::try_from(r.get_i32()?)?,
            work_item: WorkItemMsg::decode(r)?,
            step: ProcessStepMsg::decode(r)?,
            next: NextActionMsg::decode(r)?,
            boundary: r.get_i32()?,
        })
    }
}

// ============================================================================
// WORK_ITEM_INSERT
// ============================================================================

/// Outcome of a work item registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum WorkItemInsertOutcome {
    /// Registration failed for a non-business reason.
    #[default]
    Failed = 0,
    /// Work item registered; serial and timestamp are set.
    Created = 1,
    /// Another work item with the same QR is still incomplete.
    ActiveWorkExists = 2,
}

impl TryFrom<i32> for WorkItemInsertOutcome {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Failed),
            1 => Ok(Self::Created),
            2 => Ok(Self::ActiveWorkExists),
            other => Err(WireError::UnknownOutcome(other)),
        }
    }
}

/// Marker for the `WORK_ITEM_INSERT` command.
pub struct WorkItemInsert;

impl Command for WorkItemInsert {
    const ID: CommandId = CommandId::WorkItemInsert;
    type Request = WorkItemInsertRequest;
    type Response = WorkItemInsertResponse;
}

/// Request for `WORK_ITEM_INSERT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkItemInsertRequest {
    /// Source QR code.
    pub qr_code: String,
    /// Company name.
    pub company: String,
    /// Manager name.
    pub manager: String,
    /// Required step execution order.
    pub step_ids: Vec<i32>,
}

impl WireEncode for WorkItemInsertRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.qr_code)?;
        w.put_str(&self.company)?;
        w.put_str(&self.manager)?;
        w.put_i32_list(&self.step_ids)
    }
}

impl WireDecode for WorkItemInsertRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            qr_code: r.get_str()?,
            company: r.get_str()?,
            manager: r.get_str()?,
            step_ids: r.get_i32_list()?,
        })
    }
}

/// Response for `WORK_ITEM_INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItemInsertResponse {
    /// Registration outcome.
    pub outcome: WorkItemInsertOutcome,
    /// Store-generated serial, empty unless created.
    pub serial: String,
    /// Creation timestamp, epoch unless created.
    pub created_at: DateTime<Utc>,
}

impl Default for WorkItemInsertResponse {
    fn default() -> Self {
        Self {
            outcome: WorkItemInsertOutcome::Failed,
            serial: String::new(),
            created_at: epoch(),
        }
    }
}

impl WireEncode for WorkItemInsertResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.outcome as i32)?;
        w.put_str(&self.serial)?;
        w.put_timestamp(self.created_at)
    }
}

impl WireDecode for WorkItemInsertResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            outcome: WorkItemInsertOutcome::try_from(r.get_i32()?)?,
            serial: r.get_str()?,
            created_at: r.get_timestamp()?,
        })
    }
}

// ============================================================================
// WORK_ITEM_GET
// ============================================================================

/// Marker for the `WORK_ITEM_GET` command.
pub struct WorkItemGet;

impl Command for WorkItemGet {
    const ID: CommandId = CommandId::WorkItemGet;
    type Request = WorkItemGetRequest;
    type Response = WorkItemGetResponse;
}

/// Request for `WORK_ITEM_GET`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkItemGetRequest {
    /// Serial of the work item to fetch.
    pub serial: String,
}

impl WireEncode for WorkItemGetRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.serial)
    }
}

impl WireDecode for WorkItemGetRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            serial: r.get_str()?,
        })
    }
}

/// Response for `WORK_ITEM_GET`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkItemGetResponse {
    /// Whether the serial resolved to a work item.
    pub found: bool,
    /// The work item, defaults when not found.
    pub work_item: WorkItemMsg,
    /// Definitions for each step in the work item's sequence.
    pub steps: Vec<ProcessStepMsg>,
    /// Transition history, newest first.
    pub transitions: Vec<TransitionMsg>,
}

impl WireEncode for WorkItemGetResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_bool(self.found)?;
        self.work_item.encode(w)?;
        w.put_list(&self.steps)?;
        w.put_list(&self.transitions)
    }
}

impl WireDecode for WorkItemGetResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            found: r.get_bool()?,
            work_item: WorkItemMsg::decode(r)?,
            steps: r.get_list()?,
            transitions: r.get_list()?,
        })
    }
}

// ============================================================================
// WORK_ITEM_LIST / PROCESS_STEP_LIST
// ============================================================================

/// Marker for the `WORK_ITEM_LIST` command.
pub struct WorkItemList;

impl Command for WorkItemList {
    const ID: CommandId = CommandId::WorkItemList;
    type Request = PageRequest;
    type Response = WorkItemListResponse;
}

/// Marker for the `PROCESS_STEP_LIST` command.
pub struct ProcessStepList;

impl Command for ProcessStepList {
    const ID: CommandId = CommandId::ProcessStepList;
    type Request = PageRequest;
    type Response = ProcessStepListResponse;
}

/// Zero-based page request shared by the listing commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: i32,
}

impl WireEncode for PageRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.page)
    }
}

impl WireDecode for PageRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            page: r.get_i32()?,
        })
    }
}

/// Response for `WORK_ITEM_LIST`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkItemListResponse {
    /// Total work item count across all pages.
    pub total: i32,
    /// One page of work items, newest first.
    pub items: Vec<WorkItemMsg>,
}

impl WireEncode for WorkItemListResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.total)?;
        w.put_list(&self.items)
    }
}

impl WireDecode for WorkItemListResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            total: r.get_i32()?,
            items: r.get_list()?,
        })
    }
}

/// Response for `PROCESS_STEP_LIST`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessStepListResponse {
    /// Total non-archived step count across all pages.
    pub total: i32,
    /// One page of step definitions.
    pub steps: Vec<ProcessStepMsg>,
}

impl WireEncode for ProcessStepListResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.total)?;
        w.put_list(&self.steps)
    }
}

impl WireDecode for ProcessStepListResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            total: r.get_i32()?,
            steps: r.get_list()?,
        })
    }
}

// ============================================================================
// PROCESS_STEP_UPSERT
// ============================================================================

/// Outcome of a process step insert/update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ProcessStepUpsertOutcome {
    /// Definition saved.
    Saved = 0,
    /// The input QR collides with another non-archived step.
    DuplicateInputQr = 1,
    /// The output QR collides with another non-archived step.
    DuplicateOutputQr = 2,
    /// Save failed for a non-business reason.
    #[default]
    Failed = 3,
    /// Update addressed a step id that does not exist.
    NotFound = 4,
}

impl TryFrom<i32> for ProcessStepUpsertOutcome {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Saved),
            1 => Ok(Self::DuplicateInputQr),
            2 => Ok(Self::DuplicateOutputQr),
            3 => Ok(Self::Failed),
            4 => Ok(Self::NotFound),
            other => Err(WireError::UnknownOutcome(other)),
        }
    }
}

/// Marker for the `PROCESS_STEP_UPSERT` command.
pub struct ProcessStepUpsert;

impl Command for ProcessStepUpsert {
    const ID: CommandId = CommandId::ProcessStepUpsert;
    type Request = ProcessStepUpsertRequest;
    type Response = ProcessStepUpsertResponse;
}

/// Request for `PROCESS_STEP_UPSERT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessStepUpsertRequest {
    /// [`NO_STEP`] to insert, an existing step id to update.
    pub step_id: i32,
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

impl WireEncode for ProcessStepUpsertRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.step_id)?;
        w.put_str(&self.name)?;
        w.put_str(&self.location)?;
        w.put_str(&self.input_qr)?;
        w.put_str(&self.output_qr)?;
        w.put_map(&self.params)
    }
}

impl WireDecode for ProcessStepUpsertRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            step_id: r.get_i32()?,
            name: r.get_str()?,
            location: r.get_str()?,
            input_qr: r.get_str()?,
            output_qr: r.get_str()?,
            params: r.get_map()?,
        })
    }
}

/// Response for `PROCESS_STEP_UPSERT`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessStepUpsertResponse {
    /// Upsert outcome.
    pub outcome: ProcessStepUpsertOutcome,
    /// The saved step's id (store-generated on insert), [`NO_STEP`] otherwise.
    pub step_id: i32,
}

impl WireEncode for ProcessStepUpsertResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.outcome as i32)?;
        w.put_i32(self.step_id)
    }
}

impl WireDecode for ProcessStepUpsertResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            outcome: ProcessStepUpsertOutcome::try_from(r.get_i32()?)?,
            step_id: r.get_i32()?,
        })
    }
}

// ============================================================================
// PROCESS_STEP_ARCHIVE
// ============================================================================

/// Outcome of a process step archive request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum ProcessStepArchiveOutcome {
    /// Step soft-deleted.
    Archived = 0,
    /// An incomplete work item still references the step.
    StepInUse = 1,
    /// No step with that id.
    NotFound = 2,
    /// Archive failed for a non-business reason.
    #[default]
    Failed = 3,
}

impl TryFrom<i32> for ProcessStepArchiveOutcome {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        match value {
            0 => Ok(Self::Archived),
            1 => Ok(Self::StepInUse),
            2 => Ok(Self::NotFound),
            3 => Ok(Self::Failed),
            other => Err(WireError::UnknownOutcome(other)),
        }
    }
}

/// Marker for the `PROCESS_STEP_ARCHIVE` command.
pub struct ProcessStepArchive;

impl Command for ProcessStepArchive {
    const ID: CommandId = CommandId::ProcessStepArchive;
    type Request = ProcessStepArchiveRequest;
    type Response = ProcessStepArchiveResponse;
}

/// Request for `PROCESS_STEP_ARCHIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessStepArchiveRequest {
    /// Id of the step to archive.
    pub step_id: i32,
}

impl WireEncode for ProcessStepArchiveRequest {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.step_id)
    }
}

impl WireDecode for ProcessStepArchiveRequest {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            step_id: r.get_i32()?,
        })
    }
}

/// Response for `PROCESS_STEP_ARCHIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessStepArchiveResponse {
    /// Archive outcome.
    pub outcome: ProcessStepArchiveOutcome,
}

impl WireEncode for ProcessStepArchiveResponse {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_i32(self.outcome as i32)
    }
}

impl WireDecode for ProcessStepArchiveResponse {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            outcome: ProcessStepArchiveOutcome::try_from(r.get_i32()?)?,
        })
    }
}

// ============================================================================
// Failure reply
// ============================================================================

/// Generic failure reply, sent with [`CommandId::Error`] when a handler hits
/// a store failure. Distinguishable from every business outcome by its
/// command id alone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FailureMsg {
    /// Machine-readable failure code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Marker for the generic failure reply.
pub struct Failure;

impl Command for Failure {
    const ID: CommandId = CommandId::Error;
    type Request = FailureMsg;
    type Response = ();
}

impl WireEncode for FailureMsg {
    fn encode(&self, w: &mut WireWriter) -> Result<(), WireError> {
        w.put_str(&self.code)?;
        w.put_str(&self.message)
    }
}

impl WireDecode for FailureMsg {
    fn decode(r: &mut WireReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            code: r.get_str()?,
            message: r.get_str()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::peek_command_id;
    use chrono::TimeZone;

    fn sample_step() -> ProcessStepMsg {
        let mut params = BTreeMap::new();
        params.insert("temp".to_owned(), "180C".to_owned());
        ProcessStepMsg {
            step_id: 10,
            name: "Paint".to_owned(),
            location: "Bay 2".to_owned(),
            input_qr: "IN-10".to_owned(),
            output_qr: "OUT-10".to_owned(),
            params,
            created_at: Utc.with_ymd_and_hms(2025, 1, 6, 8, 0, 0).unwrap(),
        }
    }

    fn sample_work_item() -> WorkItemMsg {
        WorkItemMsg {
            serial: "W-000017".to_owned(),
            qr_code: "ITEM-17".to_owned(),
            company: "Acme".to_owned(),
            manager: "Kim".to_owned(),
            step_ids: vec![10, 20],
            created_at: Utc.with_ymd_and_hms(2025, 1, 7, 9, 30, 0).unwrap(),
        }
    }

    #[test]
    fn workflow_advance_round_trip() {
        let request = WorkflowAdvanceRequest {
            code: "IN-10".to_owned(),
            step_id: 10,
            boundary: BOUNDARY_ENTRY,
        };
        let response = WorkflowAdvanceResponse {
            outcome: WorkflowOutcome::WorkAdvanced,
            work_item: sample_work_item(),
            step: ProcessStepMsg::default(),
            next: NextActionMsg {
                step_id: 10,
                boundary: BOUNDARY_EXIT,
                step: sample_step(),
            },
            boundary: BOUNDARY_ENTRY,
        };

        let bytes = WorkflowAdvance::encode(&request, &response).unwrap();
        assert_eq!(
            peek_command_id(&bytes).unwrap(),
            CommandId::WorkflowAdvance
        );
        let (req, resp) = WorkflowAdvance::decode(&bytes).unwrap();
        assert_eq!(req, request);
        assert_eq!(resp, response);
    }

    #[test]
    fn work_item_get_round_trip_with_history() {
        let request = WorkItemGetRequest {
            serial: "W-000017".to_owned(),
        };
        let response = WorkItemGetResponse {
            found: true,
            work_item: sample_work_item(),
            steps: vec![sample_step()],
            transitions: vec![TransitionMsg {
                serial: "W-000017".to_owned(),
                step_id: 10,
                boundary: BOUNDARY_ENTRY,
                recorded_at: Utc.with_ymd_and_hms(2025, 1, 7, 10, 0, 0).unwrap(),
            }],
        };

        let bytes = WorkItemGet::encode(&request, &response).unwrap();
        let (req, resp) = WorkItemGet::decode(&bytes).unwrap();
        assert_eq!(req, request);
        assert_eq!(resp, response);
    }

    #[test]
    fn upsert_round_trip() {
        let request = ProcessStepUpsertRequest {
            step_id: NO_STEP,
            name: "Weld".to_owned(),
            location: "Bay 1".to_owned(),
            input_qr: "IN-W".to_owned(),
            output_qr: "OUT-W".to_owned(),
            params: BTreeMap::new(),
        };
        let response = ProcessStepUpsertResponse {
            outcome: ProcessStepUpsertOutcome::Saved,
            step_id: 31,
        };

        let bytes = ProcessStepUpsert::encode(&request, &response).unwrap();
        let (req, resp) = ProcessStepUpsert::decode(&bytes).unwrap();
        assert_eq!(req, request);
        assert_eq!(resp, response);
    }

    #[test]
    fn list_round_trip_preserves_order() {
        let response = WorkItemListResponse {
            total: 42,
            items: vec![sample_work_item(), WorkItemMsg::default()],
        };
        let bytes = WorkItemList::encode(&PageRequest { page: 3 }, &response).unwrap();
        let (req, resp) = WorkItemList::decode(&bytes).unwrap();
        assert_eq!(req.page, 3);
        assert_eq!(resp, response);
    }

    #[test]
    fn failure_reply_round_trip() {
        let failure = FailureMsg {
            code: "STORE_FAILURE".to_owned(),
            message: "store call timed out".to_owned(),
        };
        let bytes = Failure::encode(&failure, &()).unwrap();
        assert_eq!(peek_command_id(&bytes).unwrap(), CommandId::Error);
        let (decoded, ()) = Failure::decode(&bytes).unwrap();
        assert_eq!(decoded, failure);
    }

    #[test]
    fn outcome_codes_are_stable() {
        assert_eq!(WorkflowOutcome::WorkAdvanced as i32, 0);
        assert_eq!(WorkflowOutcome::StepRecognized as i32, 1);
        assert_eq!(WorkflowOutcome::WorkCompleted as i32, 2);
        assert_eq!(WorkflowOutcome::InvalidCode as i32, 3);
        assert_eq!(WorkflowOutcome::NoProcessDefinition as i32, 4);
        assert_eq!(WorkflowOutcome::NoWorkContext as i32, 5);
    }
}
