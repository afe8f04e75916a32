// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::time::Duration;

/// Traceflow Core configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Deadline for a single store operation
    pub store_timeout: Duration,
    /// Rows per page for the listing commands
    pub page_size: i64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TRACEFLOW_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional (with defaults):
    /// - `TRACEFLOW_STORE_TIMEOUT_MS`: per-operation store deadline in
    ///   milliseconds (default: 5000)
    /// - `TRACEFLOW_PAGE_SIZE`: rows per listing page (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("TRACEFLOW_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("TRACEFLOW_DATABASE_URL"))?;

        let store_timeout_ms: u64 = std::env::var("TRACEFLOW_STORE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TRACEFLOW_STORE_TIMEOUT_MS",
                    "must be a duration in milliseconds",
                )
            })?;
        if store_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "TRACEFLOW_STORE_TIMEOUT_MS",
                "must be greater than zero",
            ));
        }

        let page_size: i64 = std::env::var("TRACEFLOW_PAGE_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("TRACEFLOW_PAGE_SIZE", "must be a positive integer")
            })?;
        if page_size <= 0 {
            return Err(ConfigError::Invalid(
                "TRACEFLOW_PAGE_SIZE",
                "must be greater than zero",
            ));
        }

        Ok(Self {
            database_url,
            store_timeout: Duration::from_millis(store_timeout_ms),
            page_size,
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
