//! Error types for the relay core
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use thiserror::Error;

/// Relay core error
///
/// `MalformedAddress` is a configuration error and fatal to the affected
/// relay only; `BindFailed` is socket-level and never fatal to the
/// process. Nothing in the relay core retries.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Relay descriptor or address could not be parsed
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    /// Socket bind failed
    #[error("Bind failed on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    /// STUN/TURN message could not be decoded
    #[error("Malformed STUN message: {0}")]
    MalformedMessage(String),

    /// Authentication of an Allocate request failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Allocation not found
    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),

    /// Allocation expired
    #[error("Allocation expired: {0}")]
    AllocationExpired(String),

    /// Server-side relay error
    #[error("Relay error: {0}")]
    ServerError(String),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
