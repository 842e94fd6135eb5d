//! TURN allocation bookkeeping
//!
//! Tracks one allocation per authenticated client session: its relay
//! socket, lease, and position in the per-allocation state machine
//! `Unauthenticated -> Authenticated -> (Redirected | Allocated) ->
//! Active -> Expired/Closed`.
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
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use uuid::Uuid;

/// Default TURN lease when the client requests none
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(600);
/// Upper bound on granted leases
pub const MAX_LIFETIME: Duration = Duration::from_secs(3600);

/// Per-allocation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationState {
    /// Request seen, integrity not yet verified
    Unauthenticated,
    /// Integrity verified, not yet granted
    Authenticated,
    /// Redirect policy terminated the attempt
    Redirected,
    /// Relay socket reserved, no traffic yet
    Allocated,
    /// At least one relayed packet seen
    Active,
    /// Lease ran out
    Expired,
    /// Explicitly closed
    Closed,
}

/// One TURN allocation
#[derive(Debug, Clone)]
pub struct Allocation {
    pub id: Uuid,
    pub client_addr: SocketAddr,
    /// Relayed-media socket, bound in the external address family
    pub relay_socket: Arc<UdpSocket>,
    pub relay_addr: SocketAddr,
    pub username: String,
    pub state: AllocationState,
    pub lifetime: Duration,
    pub expires_at: Instant,
    pub bytes_relayed: u64,
}

impl Allocation {
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    /// Extend the lease, clamped to the maximum; returns the granted lease
    pub fn refresh(&mut self, lifetime: Duration) -> Duration {
        let granted = lifetime.min(MAX_LIFETIME);
        self.lifetime = granted;
        self.expires_at = Instant::now() + granted;
        granted
    }

    /// Allocated -> Active on the first relayed packet
    pub fn record_traffic(&mut self, bytes: usize) {
        if self.state == AllocationState::Allocated {
            self.state = AllocationState::Active;
        }
        self.bytes_relayed += bytes as u64;
    }
}

/// Allocation table, keyed by client transport address
pub struct AllocationTable {
    allocations: HashMap<SocketAddr, Allocation>,
    max_allocations: usize,
}

impl AllocationTable {
    pub fn new(max_allocations: usize) -> Self {
        AllocationTable {
            allocations: HashMap::new(),
            max_allocations,
        }
    }

    /// Insert an allocation in `Allocated` state, returning the granted
    /// lease
    ///
    /// An existing entry for the same client (necessarily stale; callers
    /// answer live duplicates before binding a new relay socket) is
    /// replaced and does not count against the quota.
    pub fn insert(
        &mut self,
        client_addr: SocketAddr,
        relay_socket: Arc<UdpSocket>,
        relay_addr: SocketAddr,
        username: String,
        lifetime: Option<Duration>,
    ) -> RelayResult<Duration> {
        if self.allocations.len() >= self.max_allocations
            && !self.allocations.contains_key(&client_addr)
        {
            return Err(RelayError::ServerError(
                "maximum allocations reached".to_string(),
            ));
        }

        let lifetime = lifetime.unwrap_or(DEFAULT_LIFETIME).min(MAX_LIFETIME);
        let allocation = Allocation {
            id: Uuid::new_v4(),
            client_addr,
            relay_socket,
            relay_addr,
            username,
            state: AllocationState::Allocated,
            lifetime,
            expires_at: Instant::now() + lifetime,
            bytes_relayed: 0,
        };

        self.allocations.insert(client_addr, allocation);
        Ok(lifetime)
    }

    pub fn get(&self, client_addr: &SocketAddr) -> Option<&Allocation> {
        self.allocations.get(client_addr)
    }

    pub fn get_mut(&mut self, client_addr: &SocketAddr) -> Option<&mut Allocation> {
        self.allocations.get_mut(client_addr)
    }

    /// Extend an existing lease, returning the granted (clamped) lease
    pub fn refresh(
        &mut self,
        client_addr: &SocketAddr,
        lifetime: Duration,
    ) -> RelayResult<Duration> {
        let allocation = self
            .allocations
            .get_mut(client_addr)
            .ok_or_else(|| RelayError::AllocationNotFound(client_addr.to_string()))?;
        if allocation.is_expired() {
            return Err(RelayError::AllocationExpired(client_addr.to_string()));
        }
        Ok(allocation.refresh(lifetime))
    }

    /// Close and drop an allocation, releasing its relay socket
    pub fn close(&mut self, client_addr: &SocketAddr) -> RelayResult<()> {
        let mut allocation = self
            .allocations
            .remove(client_addr)
            .ok_or_else(|| RelayError::AllocationNotFound(client_addr.to_string()))?;
        allocation.state = AllocationState::Closed;
        Ok(())
    }

    /// Drop expired allocations, returning how many were removed
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let initial = self.allocations.len();
        self.allocations.retain(|_, a| a.expires_at > now);
        initial - self.allocations.len()
    }

    pub fn len(&self) -> usize {
        self.allocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }
}
