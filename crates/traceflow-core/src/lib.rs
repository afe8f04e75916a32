// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Traceflow core: the server side of an industrial traceability terminal.
//!
//! Shop-floor terminals scan QR codes and send binary commands over the
//! `traceflow-protocol` wire format. This crate interprets those commands:
//! the recognition engine classifies each scan against the live transition
//! history of the matching work item, the handlers serve registration and
//! lookup commands, and the PostgreSQL store keeps the history append-only
//! with a denormalized audit snapshot per step visit.
//!
//! # Modules
//!
//! - [`config`]: environment-variable configuration
//! - [`domain`]: work items, process steps, transitions, audit snapshots
//! - [`engine`]: scan recognition and workflow advancement
//! - [`handlers`]: one handler per protocol command
//! - [`dispatch`]: command-id routing and failure replies
//! - [`persistence`]: the [`persistence::Store`] trait and its PostgreSQL
//!   implementation
//! - [`migrations`]: embedded schema migrations

#![deny(missing_docs)]

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod migrations;
pub mod persistence;

pub use config::{Config, ConfigError};
pub use dispatch::Dispatcher;
pub use engine::{Recognition, RecognitionEngine, StepHint};
pub use error::{CoreError, Result};
pub use persistence::{PostgresStore, Store};
