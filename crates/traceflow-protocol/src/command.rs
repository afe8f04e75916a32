// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command ids and the message envelope.
//!
//! The first four bytes of every message are the command id. A handler
//! accepts a message only when the leading id matches its own command;
//! [`decode_message`] enforces this before touching a single request field,
//! so a mismatched handler's state is never populated.

use bytes::Bytes;

use crate::wire::{WireDecode, WireEncode, WireError, WireReader, WireWriter};

/// Numeric tag identifying which remote operation a message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum CommandId {
    /// Generic failure reply, never sent as a request.
    Error = 0,
    /// Interpret a scanned QR code and advance a work item.
    WorkflowAdvance = 10,
    /// Register a new work item.
    WorkItemInsert = 20,
    /// Fetch one work item with its steps and transition history.
    WorkItemGet = 21,
    /// Page through registered work items.
    WorkItemList = 22,
    /// Insert or update a process step definition.
    ProcessStepUpsert = 30,
    /// Page through non-archived process step definitions.
    ProcessStepList = 31,
    /// Soft-delete a process step definition.
    ProcessStepArchive = 32,
}

impl TryFrom<i32> for CommandId {
    type Error = WireError;

    fn try_from(value: i32) -> Result<Self, WireError> {
        match value {
            0 => Ok(CommandId::Error),
            10 => Ok(CommandId::WorkflowAdvance),
            20 => Ok(CommandId::WorkItemInsert),
            21 => Ok(CommandId::WorkItemGet),
            22 => Ok(CommandId::WorkItemList),
            30 => Ok(CommandId::ProcessStepUpsert),
            31 => Ok(CommandId::ProcessStepList),
            32 => Ok(CommandId::ProcessStepArchive),
            other => Err(WireError::UnknownCommandId(other)),
        }
    }
}

/// Read the leading command id without consuming the message.
pub fn peek_command_id(bytes: &[u8]) -> Result<CommandId, WireError> {
    let mut reader = WireReader::new(bytes);
    CommandId::try_from(reader.get_i32()?)
}

/// Encode a complete message: command id, request fields, response fields.
pub fn encode_message<Req, Resp>(
    id: CommandId,
    request: &Req,
    response: &Resp,
) -> Result<Bytes, WireError>
where
    Req: WireEncode,
    Resp: WireEncode,
{
    let mut writer = WireWriter::new();
    writer.put_i32(id as i32)?;
    request.encode(&mut writer)?;
    response.encode(&mut writer)?;
    Ok(writer.finish())
}

/// Decode a complete message after verifying the leading command id.
///
/// Returns [`WireError::CommandMismatch`] without decoding any field when
/// the message carries a different command id.
pub fn decode_message<Req, Resp>(
    expected: CommandId,
    bytes: &[u8],
) -> Result<(Req, Resp), WireError>
where
    Req: WireDecode,
    Resp: WireDecode,
{
    let mut reader = WireReader::new(bytes);
    let actual = reader.get_i32()?;
    if actual != expected as i32 {
        return Err(WireError::CommandMismatch {
            expected: expected as i32,
            actual,
        });
    }
    let request = Req::decode(&mut reader)?;
    let response = Resp::decode(&mut reader)?;
    Ok((request, response))
}

/// A command pairs a numeric id with its request and response message types.
///
/// Commands are independent implementations registered in the dispatcher's
/// routing table; there is no shared base state.
pub trait Command {
    /// The command id this command answers to.
    const ID: CommandId;
    /// Request message type.
    type Request: WireEncode + WireDecode;
    /// Response message type; `Default` supplies the declared defaults the
    /// caller sends before the server fills the response in.
    type Response: WireEncode + WireDecode + Default;

    /// Whether the leading id of `bytes` matches this command.
    fn accepts(bytes: &[u8]) -> bool {
        peek_command_id(bytes).is_ok_and(|id| id == Self::ID)
    }

    /// Decode a message addressed to this command.
    fn decode(bytes: &[u8]) -> Result<(Self::Request, Self::Response), WireError> {
        decode_message(Self::ID, bytes)
    }

    /// Encode a reply: the request echoed back with the response filled in.
    fn encode(request: &Self::Request, response: &Self::Response) -> Result<Bytes, WireError> {
        encode_message(Self::ID, request, response)
    }
}
