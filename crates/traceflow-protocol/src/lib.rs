// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Traceflow wire protocol.
//!
//! Every remote call is a single binary message with the following layout:
//! - 4 bytes: command id (little-endian `i32`)
//! - N bytes: request fields in fixed declared order
//! - M bytes: response fields in fixed declared order
//!
//! Both sides carry request *and* response fields: the caller sends its
//! request together with default response fields, the server echoes the
//! request back with the response filled in. Field order is positional and
//! fixed per command; there are no tags or schemas on the wire.
//!
//! # Modules
//!
//! - [`wire`]: positional codec for primitives and composite records
//! - [`command`]: command ids, envelope encode/decode, the [`command::Command`] trait
//! - [`messages`]: request/response types for every command

#![deny(missing_docs)]

pub mod command;
pub mod messages;
pub mod wire;

pub use command::{Command, CommandId, decode_message, encode_message, peek_command_id};
pub use wire::{WireDecode, WireEncode, WireError, WireReader, WireWriter};
