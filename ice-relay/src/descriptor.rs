//! Relay descriptor parsing
//!
//! A relay descriptor is a compound string of the form
//! `[ignored@]*token@host:port`. Only the last two `@`-delimited segments
//! matter: the text after the final `@` is the socket address, the
//! segment right before it is the auth token. Earlier segments are legacy
//! placeholders and are discarded. A descriptor without `@` is a bare
//! address with an empty token.
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


use crate::error::{RelayError, RelayResult};
use std::net::{SocketAddr, ToSocketAddrs};

/// Parsed relay descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayDescriptor {
    /// Auth token segment, empty when the descriptor had no `@`
    pub auth_token: String,
    /// Resolved socket address
    pub address: SocketAddr,
}

impl RelayDescriptor {
    /// Parse a compound relay descriptor
    ///
    /// Used once for the internal bind address and once for the
    /// externally advertised address; the two descriptors are independent
    /// strings and must be parsed separately.
    pub fn parse(descriptor: &str) -> RelayResult<Self> {
        let (auth_token, address_text) = match descriptor.rfind('@') {
            Some(at) => {
                let token_part = &descriptor[..at];
                let token = token_part
                    .rsplit('@')
                    .next()
                    .unwrap_or_default();
                (token.to_string(), &descriptor[at + 1..])
            }
            None => (String::new(), descriptor),
        };

        let address = resolve_address(address_text)?;
        Ok(RelayDescriptor { auth_token, address })
    }
}

/// Resolve a `host:port` string to a socket address
///
/// Accepts numeric `ip:port` directly and falls back to name resolution
/// for `hostname:port`.
pub fn resolve_address(text: &str) -> RelayResult<SocketAddr> {
    if let Ok(addr) = text.parse::<SocketAddr>() {
        return Ok(addr);
    }

    text.to_socket_addrs()
        .map_err(|e| RelayError::MalformedAddress(format!("{}: {}", text, e)))?
        .next()
        .ok_or_else(|| RelayError::MalformedAddress(format!("{}: no address", text)))
}
