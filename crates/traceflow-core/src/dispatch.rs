// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Message dispatcher: routes an incoming message to its handler by the
//! leading command id.
//!
//! Routing is total. Unknown ids, malformed requests and handler failures
//! all produce a [`Failure`] reply under [`CommandId::Error`]; no request
//! mutates state unless its command id routed it to a handler that chose
//! to write.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, instrument, warn};

use traceflow_protocol::messages::{
    Failure, FailureMsg, ProcessStepArchive, ProcessStepList, ProcessStepUpsert, WorkItemGet,
    WorkItemInsert, WorkItemList, WorkflowAdvance,
};
use traceflow_protocol::{Command, CommandId, peek_command_id};

use crate::engine::RecognitionEngine;
use crate::error::CoreError;
use crate::handlers;
use crate::persistence::Store;

/// Encode a failure reply. Failure encoding itself cannot realistically
/// fail, but a bare error command id goes out if it somehow does.
fn failure_reply(code: &str, message: &str) -> Bytes {
    let failure = FailureMsg {
        code: code.to_string(),
        message: message.to_string(),
    };
    Failure::encode(&failure, &())
        .unwrap_or_else(|_| Bytes::copy_from_slice(&(CommandId::Error as i32).to_le_bytes()))
}

fn handler_failure(id: CommandId, err: anyhow::Error) -> Bytes {
    let code = err
        .downcast_ref::<CoreError>()
        .map(CoreError::error_code)
        .unwrap_or("INTERNAL_ERROR");
    error!(command = ?id, error = %err, "handler failed");
    failure_reply(code, &err.to_string())
}

fn encode_reply<C: Command>(request: &C::Request, response: &C::Response) -> Bytes {
    C::encode(request, response).unwrap_or_else(|err| {
        error!(command = ?C::ID, error = %err, "response did not fit the wire");
        failure_reply("ENCODE_ERROR", &err.to_string())
    })
}

macro_rules! route {
    ($bytes:ident, $cmd:ty, $request:ident => $call:expr) => {{
        let ($request, _) = match <$cmd>::decode($bytes) {
            Ok(parts) => parts,
            Err(err) => {
                warn!(command = ?<$cmd>::ID, error = %err, "malformed request");
                return failure_reply("MALFORMED_REQUEST", &err.to_string());
            }
        };
        match $call {
            Ok(response) => encode_reply::<$cmd>(&$request, &response),
            Err(err) => handler_failure(<$cmd>::ID, err),
        }
    }};
}

/// Routes decoded messages to handlers over a shared [`Store`].
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    engine: RecognitionEngine,
    page_size: i64,
}

impl Dispatcher {
    /// Create a dispatcher over the given store.
    pub fn new(store: Arc<dyn Store>, page_size: i64) -> Self {
        let engine = RecognitionEngine::new(Arc::clone(&store));
        Self {
            store,
            engine,
            page_size,
        }
    }

    /// Serve one message and produce the reply to send back.
    #[instrument(skip_all)]
    pub async fn dispatch(&self, bytes: &[u8]) -> Bytes {
        let id = match peek_command_id(bytes) {
            Ok(id) => id,
            Err(err) => {
                warn!(error = %err, "unroutable message");
                return failure_reply("UNKNOWN_COMMAND", &err.to_string());
            }
        };

        match id {
            CommandId::Error => {
                warn!("error reply received as a request");
                failure_reply("UNKNOWN_COMMAND", "error replies are not requests")
            }
            CommandId::WorkflowAdvance => route!(bytes, WorkflowAdvance, request => {
                handlers::handle_workflow_advance(&self.engine, &request).await
            }),
            CommandId::WorkItemInsert => route!(bytes, WorkItemInsert, request => {
                handlers::handle_work_item_insert(self.store.as_ref(), &request).await
            }),
            CommandId::WorkItemGet => route!(bytes, WorkItemGet, request => {
                handlers::handle_work_item_get(self.store.as_ref(), &request).await
            }),
            CommandId::WorkItemList => route!(bytes, WorkItemList, request => {
                handlers::handle_work_item_list(self.store.as_ref(), self.page_size, &request)
                    .await
            }),
            CommandId::ProcessStepUpsert => route!(bytes, ProcessStepUpsert, request => {
                handlers::handle_process_step_upsert(self.store.as_ref(), &request).await
            }),
            CommandId::ProcessStepList => route!(bytes, ProcessStepList, request => {
                handlers::handle_process_step_list(self.store.as_ref(), self.page_size, &request)
                    .await
            }),
            CommandId::ProcessStepArchive => route!(bytes, ProcessStepArchive, request => {
                handlers::handle_process_step_archive(self.store.as_ref(), &request).await
            }),
        }
    }
}
