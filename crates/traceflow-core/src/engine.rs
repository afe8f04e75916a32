// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow recognition: interpret a scanned QR code against the live state
//! of the floor and, when the scan crosses the expected boundary, record it.
//!
//! Two recognition modes exist. Code-only recognition classifies a bare scan
//! and never writes. Hinted recognition carries the step and boundary the
//! operator claims to have performed; the claim is validated against the
//! work item's transition history and persisted only when it matches the
//! single scan the item will accept next.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::{Boundary, ExpectedLatest, ExpectedScan, ProcessStep, WorkItem};
use crate::error::{CoreError, Result};
use crate::persistence::Store;

/// The step and boundary an operator claims a scan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepHint {
    /// Claimed step id.
    pub step_id: i32,
    /// Claimed boundary.
    pub boundary: Boundary,
}

/// Everything a terminal needs to render after a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum Recognition {
    /// The code is a step boundary QR with no work item context.
    StepBoundary {
        /// The step whose QR was scanned.
        step: ProcessStep,
        /// Which of its boundaries matched.
        boundary: Boundary,
    },
    /// The code identified a work item; nothing was recorded.
    WorkResolved {
        /// The resolved work item.
        work: WorkItem,
        /// The scan the item will accept next.
        next: ExpectedScan,
    },
    /// A hinted scan matched the expected boundary and was recorded.
    WorkAdvanced {
        /// The work item that advanced.
        work: WorkItem,
        /// The step whose boundary was crossed.
        step: ProcessStep,
        /// Which boundary was recorded.
        boundary: Boundary,
        /// The scan the item will accept next.
        next: ExpectedScan,
    },
    /// The work item's sequence is fully traversed.
    WorkCompleted {
        /// The completed work item.
        work: WorkItem,
    },
    /// Work context is known but the code matches no expected boundary.
    InvalidCode {
        /// The resolved work item.
        work: WorkItem,
        /// The scan the item will accept instead.
        next: ExpectedScan,
    },
    /// The code matches neither a step boundary nor any work item.
    NoProcessDefinition,
    /// No usable work context: either a hinted scan resolved no work item,
    /// or the resolved item carries an empty step sequence. The empty
    /// sequence yields this outcome on the code-only path too, since the
    /// item exists but nothing can ever be recognized against it.
    NoWorkContext,
}

/// Where a work item stands, derived from its latest transition.
enum Progress {
    /// One specific scan is acceptable; `precondition` is what the latest
    /// transition must still be when the write lands.
    Expect {
        scan: ExpectedScan,
        precondition: ExpectedLatest,
    },
    /// The last step's exit is recorded; nothing more is acceptable.
    Done,
}

/// Stateless recognition engine over a [`Store`].
#[derive(Clone)]
pub struct RecognitionEngine {
    store: Arc<dyn Store>,
}

impl RecognitionEngine {
    /// Create an engine over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Interpret one scan.
    #[instrument(skip(self), fields(hinted = hint.is_some()))]
    pub async fn recognize(&self, code: &str, hint: Option<StepHint>) -> Result<Recognition> {
        match hint {
            None => self.recognize_code(code).await,
            Some(hint) => self.recognize_hinted(code, hint).await,
        }
    }

    /// Code-only recognition. Read-only.
    async fn recognize_code(&self, code: &str) -> Result<Recognition> {
        if let Some(step) = self.store.find_step_by_qr(code).await?
            && let Some(boundary) = step.boundary_of(code)
        {
            debug!(step_id = step.step_id, ?boundary, "code matched a step boundary");
            return Ok(Recognition::StepBoundary { step, boundary });
        }

        let Some(work) = self.store.find_work_item_by_qr(code).await? else {
            debug!("code matched nothing");
            return Ok(Recognition::NoProcessDefinition);
        };
        if work.step_ids.is_empty() {
            return Ok(Recognition::NoWorkContext);
        }

        match self.progress_of(&work).await? {
            Progress::Done => Ok(Recognition::WorkCompleted { work }),
            Progress::Expect { scan, .. } => Ok(Recognition::WorkResolved { work, next: scan }),
        }
    }

    /// Hinted recognition. Writes exactly one transition on success.
    async fn recognize_hinted(&self, code: &str, hint: StepHint) -> Result<Recognition> {
        let Some(work) = self.store.find_work_item_by_qr(code).await? else {
            debug!("hinted scan with no work context");
            return Ok(Recognition::NoWorkContext);
        };
        if work.step_ids.is_empty() {
            return Ok(Recognition::NoWorkContext);
        }

        let progress = self.progress_of(&work).await?;
        let Progress::Expect { scan, precondition } = progress else {
            // Already complete; a late or repeated scan never appends.
            return Ok(Recognition::WorkCompleted { work });
        };

        // The claimed boundary QR is derived from the hint, then held
        // against the one scan the history will accept.
        let Some(hinted_step) = self.store.get_step(hint.step_id).await? else {
            debug!(step_id = hint.step_id, "hint names an unknown step");
            return Ok(Recognition::InvalidCode { work, next: scan });
        };
        let claimed = hinted_step.qr_at(hint.boundary);

        if claimed != scan.step.qr_at(scan.boundary) {
            debug!(
                serial = %work.serial,
                expected_step = scan.step.step_id,
                expected_boundary = ?scan.boundary,
                "scan does not match the expected boundary"
            );
            return Ok(Recognition::InvalidCode { work, next: scan });
        }

        match scan.boundary {
            Boundary::Entry => {
                self.store
                    .record_entry(&work, &scan.step, precondition)
                    .await?;
                let next = ExpectedScan {
                    boundary: Boundary::Exit,
                    step: scan.step.clone(),
                };
                Ok(Recognition::WorkAdvanced {
                    work,
                    step: scan.step,
                    boundary: Boundary::Entry,
                    next,
                })
            }
            Boundary::Exit => {
                self.store.record_exit(&work, &scan.step).await?;
                match work.step_after(scan.step.step_id) {
                    None => Ok(Recognition::WorkCompleted { work }),
                    Some(next_id) => {
                        let next_step = self.step(next_id).await?;
                        let next = ExpectedScan {
                            boundary: Boundary::Entry,
                            step: next_step,
                        };
                        Ok(Recognition::WorkAdvanced {
                            work,
                            step: scan.step,
                            boundary: Boundary::Exit,
                            next,
                        })
                    }
                }
            }
        }
    }

    /// Derive the work item's position from its latest transition.
    async fn progress_of(&self, work: &WorkItem) -> Result<Progress> {
        let latest = self.store.latest_transition(&work.serial).await?;
        let (step_id, boundary, precondition) = match latest {
            None => {
                let Some(first) = work.first_step() else {
                    return Err(CoreError::ValidationError {
                        field: "step_ids".to_string(),
                        message: "work item has an empty step sequence".to_string(),
                    });
                };
                (first, Boundary::Entry, ExpectedLatest::None)
            }
            Some(latest) => {
                if work.index_of(latest.step_id).is_none() {
                    return Err(CoreError::CorruptHistory {
                        serial: work.serial.clone(),
                        step_id: latest.step_id,
                    });
                }
                match latest.boundary {
                    Boundary::Entry => (
                        latest.step_id,
                        Boundary::Exit,
                        ExpectedLatest::EntryOf(latest.step_id),
                    ),
                    Boundary::Exit => match work.step_after(latest.step_id) {
                        None => return Ok(Progress::Done),
                        Some(next_id) => (
                            next_id,
                            Boundary::Entry,
                            ExpectedLatest::ExitOf(latest.step_id),
                        ),
                    },
                }
            }
        };

        let step = self.step(step_id).await?;
        Ok(Progress::Expect {
            scan: ExpectedScan { boundary, step },
            precondition,
        })
    }

    async fn step(&self, step_id: i32) -> Result<ProcessStep> {
        self.store
            .get_step(step_id)
            .await?
            .ok_or(CoreError::StepNotFound { step_id })
    }
}
