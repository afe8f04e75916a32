// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embedded database migrations.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use crate::error::{CoreError, Result};

/// Migrations compiled into the binary from `migrations/postgresql`.
pub static POSTGRES: Migrator = sqlx::migrate!("./migrations/postgresql");

/// Apply any pending migrations.
pub async fn run(pool: &PgPool) -> Result<()> {
    POSTGRES
        .run(pool)
        .await
        .map_err(|err| CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: err.to_string(),
        })?;
    info!("database migrations applied");
    Ok(())
}
