//! Gateway bootstrap errors
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

/// Process-fatal bootstrap errors
///
/// Both abort startup before any relay socket is bound; relay-local
/// failures stay inside `ice_relay::RelayError` and never reach here.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The signaling engine refused to initialize
    #[error("Cannot initialize signaling engine")]
    SignalingInitFailed,

    /// The HTTP control surface could not start
    #[error("Cannot start HTTP surface: {0}")]
    HttpStartupFailed(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;
