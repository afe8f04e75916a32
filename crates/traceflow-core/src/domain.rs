// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model shared by the engine, handlers and persistence layer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which side of a process step a scan crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Boundary {
    /// The step's input QR was scanned; work entered the step.
    Entry = 0,
    /// The step's output QR was scanned; work left the step.
    Exit = 1,
}

impl Boundary {
    /// Wire representation of this boundary.
    pub fn as_wire(self) -> i32 {
        self as i32
    }

    /// Parse a wire boundary code. `None` for anything but 0 or 1.
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Entry),
            1 => Some(Self::Exit),
            _ => None,
        }
    }
}

/// A physical unit moving through a fixed sequence of process steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Store-assigned serial identifier.
    pub serial: String,
    /// Source QR code that identifies this unit on the floor.
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

impl WorkItem {
    /// First step in the sequence, `None` for an empty sequence.
    pub fn first_step(&self) -> Option<i32> {
        self.step_ids.first().copied()
    }

    /// Last step in the sequence, `None` for an empty sequence.
    pub fn last_step(&self) -> Option<i32> {
        self.step_ids.last().copied()
    }

    /// Position of `step_id` within the sequence.
    pub fn index_of(&self, step_id: i32) -> Option<usize> {
        self.step_ids.iter().position(|&id| id == step_id)
    }

    /// The step following `step_id` in the sequence, `None` when `step_id`
    /// is the last step or not part of the sequence.
    pub fn step_after(&self, step_id: i32) -> Option<i32> {
        let index = self.index_of(step_id)?;
        self.step_ids.get(index + 1).copied()
    }
}

/// A process step definition: one station with an entry and an exit QR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    /// Store-assigned step id.
    pub step_id: i32,
    /// Human-readable step name.
    pub name: String,
    /// Location label.
    pub location: String,
    /// QR code posted at the step's entry.
    pub input_qr: String,
    /// QR code posted at the step's exit.
    pub output_qr: String,
    /// Open set of named parameters.
    pub params: BTreeMap<String, String>,
    /// Whether the definition has been soft-deleted.
    pub archived: bool,
    /// When the definition was created.
    pub created_at: DateTime<Utc>,
}

impl ProcessStep {
    /// Which of this step's boundaries `code` matches, if either.
    pub fn boundary_of(&self, code: &str) -> Option<Boundary> {
        if code == self.input_qr {
            Some(Boundary::Entry)
        } else if code == self.output_qr {
            Some(Boundary::Exit)
        } else {
            None
        }
    }

    /// The QR code posted at the given boundary.
    pub fn qr_at(&self, boundary: Boundary) -> &str {
        match boundary {
            Boundary::Entry => &self.input_qr,
            Boundary::Exit => &self.output_qr,
        }
    }
}

/// One recorded boundary crossing for a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Work item serial.
    pub serial: String,
    /// Step the crossing belongs to.
    pub step_id: i32,
    /// Which boundary was crossed.
    pub boundary: Boundary,
    /// The audit snapshot opened (entry) or closed (exit) by this crossing.
    pub snapshot_id: i64,
    /// When the crossing was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Denormalized copy of work item and step state, written at step entry and
/// closed at step exit. Later edits to the step definition never rewrite what
/// was true at scan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditSnapshot {
    /// Snapshot id.
    pub id: i64,
    /// Work item serial.
    pub serial: String,
    /// Company at scan time.
    pub company: String,
    /// Manager at scan time.
    pub manager: String,
    /// Work item source QR at scan time.
    pub qr_code: String,
    /// Step sequence at scan time.
    pub step_ids: Vec<i32>,
    /// The step being worked.
    pub step_id: i32,
    /// Step name at scan time.
    pub step_name: String,
    /// Step location at scan time.
    pub step_location: String,
    /// Entry QR at scan time.
    pub input_qr: String,
    /// Exit QR recorded when the step was left, empty while open.
    pub output_qr: String,
    /// Step parameters at scan time.
    pub params: BTreeMap<String, String>,
    /// When the step was entered.
    pub entered_at: DateTime<Utc>,
    /// When the step was left, `None` while the snapshot is open.
    pub exited_at: Option<DateTime<Utc>>,
}

/// The single scan a work item will accept next.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedScan {
    /// Expected boundary.
    pub boundary: Boundary,
    /// The step whose boundary is expected.
    pub step: ProcessStep,
}

/// What the latest transition must still be when a write lands, re-checked
/// inside the store's transaction so concurrent scans cannot both succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedLatest {
    /// No transition recorded yet.
    None,
    /// Latest must be the entry of the given step.
    EntryOf(i32),
    /// Latest must be the exit of the given step.
    ExitOf(i32),
}

impl ExpectedLatest {
    /// Whether `latest` satisfies this expectation.
    pub fn matches(&self, latest: Option<&Transition>) -> bool {
        match (self, latest) {
            (Self::None, None) => true,
            (Self::EntryOf(step_id), Some(t)) => {
                t.step_id == *step_id && t.boundary == Boundary::Entry
            }
            (Self::ExitOf(step_id), Some(t)) => {
                t.step_id == *step_id && t.boundary == Boundary::Exit
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(step_ids: Vec<i32>) -> WorkItem {
        WorkItem {
            serial: "W-000001".to_string(),
            qr_code: "ITEM-1".to_string(),
            company: "Acme".to_string(),
            manager: "Kim".to_string(),
            step_ids,
            created_at: Utc::now(),
        }
    }

    fn transition(step_id: i32, boundary: Boundary) -> Transition {
        Transition {
            serial: "W-000001".to_string(),
            step_id,
            boundary,
            snapshot_id: 1,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn boundary_wire_codes() {
        assert_eq!(Boundary::Entry.as_wire(), 0);
        assert_eq!(Boundary::Exit.as_wire(), 1);
        assert_eq!(Boundary::from_wire(0), Some(Boundary::Entry));
        assert_eq!(Boundary::from_wire(1), Some(Boundary::Exit));
        assert_eq!(Boundary::from_wire(-1), None);
        assert_eq!(Boundary::from_wire(2), None);
    }

    #[test]
    fn sequence_navigation() {
        let work = item(vec![10, 20, 30]);
        assert_eq!(work.first_step(), Some(10));
        assert_eq!(work.last_step(), Some(30));
        assert_eq!(work.index_of(20), Some(1));
        assert_eq!(work.index_of(99), None);
        assert_eq!(work.step_after(10), Some(20));
        assert_eq!(work.step_after(30), None);
        assert_eq!(work.step_after(99), None);

        let empty = item(Vec::new());
        assert_eq!(empty.first_step(), None);
        assert_eq!(empty.last_step(), None);
    }

    #[test]
    fn step_boundary_lookup() {
        let step = ProcessStep {
            step_id: 10,
            name: "Weld".to_string(),
            location: "Bay 1".to_string(),
            input_qr: "IN-10".to_string(),
            output_qr: "OUT-10".to_string(),
            params: BTreeMap::new(),
            archived: false,
            created_at: Utc::now(),
        };
        assert_eq!(step.boundary_of("IN-10"), Some(Boundary::Entry));
        assert_eq!(step.boundary_of("OUT-10"), Some(Boundary::Exit));
        assert_eq!(step.boundary_of("OTHER"), None);
        assert_eq!(step.qr_at(Boundary::Entry), "IN-10");
        assert_eq!(step.qr_at(Boundary::Exit), "OUT-10");
    }

    #[test]
    fn expected_latest_matching() {
        assert!(ExpectedLatest::None.matches(None));
        assert!(!ExpectedLatest::None.matches(Some(&transition(10, Boundary::Entry))));

        assert!(ExpectedLatest::EntryOf(10).matches(Some(&transition(10, Boundary::Entry))));
        assert!(!ExpectedLatest::EntryOf(10).matches(Some(&transition(10, Boundary::Exit))));
        assert!(!ExpectedLatest::EntryOf(10).matches(Some(&transition(20, Boundary::Entry))));
        assert!(!ExpectedLatest::EntryOf(10).matches(None));

        assert!(ExpectedLatest::ExitOf(10).matches(Some(&transition(10, Boundary::Exit))));
        assert!(!ExpectedLatest::ExitOf(10).matches(Some(&transition(10, Boundary::Entry))));
    }
}
