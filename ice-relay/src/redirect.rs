//! TURN redirect policy
//!
//! A redirect policy is consulted once per authenticated Allocate request
//! and may point the client at an alternate relay instance before any
//! allocation is made. Policies are stateless lookups; the relay calls
//! them concurrently per request.
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


use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Redirect hook consulted per allocation request
///
/// Returns the alternate relay address to send the client to, or `None`
/// to let the allocation proceed. Callers must not assume redirection
/// changes the destination unless the returned address differs from the
/// relay's own advertised address.
pub trait RedirectPolicy: Send + Sync {
    fn should_redirect(&self, source: SocketAddr) -> Option<SocketAddr>;
}

/// Policy that unconditionally yields the same target address
///
/// The degenerate reference policy: structurally present but, when the
/// target equals the relay's advertised address, behaviorally inert.
#[derive(Debug, Clone, Copy)]
pub struct AlwaysRedirect {
    pub target: SocketAddr,
}

impl RedirectPolicy for AlwaysRedirect {
    fn should_redirect(&self, _source: SocketAddr) -> Option<SocketAddr> {
        Some(self.target)
    }
}

/// Policy that never redirects
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRedirect;

impl RedirectPolicy for NeverRedirect {
    fn should_redirect(&self, _source: SocketAddr) -> Option<SocketAddr> {
        None
    }
}

/// Policy redirecting selected source addresses to fixed alternates
#[derive(Debug, Clone, Default)]
pub struct AddressRedirect {
    targets: HashMap<IpAddr, SocketAddr>,
}

impl AddressRedirect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, source: IpAddr, target: SocketAddr) -> Self {
        self.targets.insert(source, target);
        self
    }
}

impl RedirectPolicy for AddressRedirect {
    fn should_redirect(&self, source: SocketAddr) -> Option<SocketAddr> {
        self.targets.get(&source.ip()).copied()
    }
}
