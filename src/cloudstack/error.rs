// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Errors returned by the CloudStack API surface.

use thiserror::Error;

/// Errors that can occur while talking to the CloudStack API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudStackError {
    /// The HTTP request could not be sent or its body could not be read
    #[error("HTTP request for {command} failed: {reason}")]
    Transport {
        /// API command being executed
        command: String,
        /// Underlying transport error
        reason: String,
    },

    /// CloudStack answered with a non-success HTTP status
    #[error("CloudStack API {command} returned HTTP {status}: {message}")]
    Http {
        /// API command being executed
        command: String,
        /// HTTP status code
        status: u16,
        /// `errortext` from the response, or the raw body
        message: String,
    },

    /// The response could not be decoded into the expected shape
    #[error("Failed to decode {command} response: {reason}")]
    Decode {
        /// API command being executed
        command: String,
        /// Explanation of what was malformed
        reason: String,
    },

    /// An asynchronous job finished with a failure status
    #[error("Async job {job_id} for {command} failed: {text}")]
    AsyncJobFailed {
        /// API command that started the job
        command: String,
        /// CloudStack job id
        job_id: String,
        /// `errortext` reported by the job
        text: String,
    },

    /// An asynchronous job did not finish in time
    #[error("Async job {job_id} for {command} did not complete within {timeout_secs}s")]
    AsyncJobTimeout {
        /// API command that started the job
        command: String,
        /// CloudStack job id
        job_id: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// A lookup by id returned no object
    #[error("{kind} {id} not found")]
    NotFound {
        /// Object kind (e.g. "network")
        kind: String,
        /// Requested id
        id: String,
    },
}

impl CloudStackError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Http { status, .. } => {
                crate::retry::is_retryable_http_status_code(*status)
            }
            _ => false,
        }
    }
}
