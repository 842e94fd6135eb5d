//! STUN/TURN relay core for the RTC gateway
//!
//! NAT-traversal building blocks consumed by the gateway's lifecycle
//! coordinator: ICE server list construction, relay descriptor parsing,
//! long-term credential hashing, the redirect policy hook, and the
//! STUN responder and authenticated TURN relay themselves.
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


pub mod allocation;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod ice_servers;
pub mod message;
pub mod redirect;
pub mod stun_server;
pub mod turn_server;

pub use allocation::{Allocation, AllocationState, AllocationTable};
pub use credentials::{CredentialKey, SelfProvisionedAuth, TurnAuthHandler};
pub use descriptor::RelayDescriptor;
pub use error::{RelayError, RelayResult};
pub use ice_servers::{IceScheme, IceServerEntry, IceServerList};
pub use redirect::{AddressRedirect, AlwaysRedirect, NeverRedirect, RedirectPolicy};
pub use stun_server::StunRelay;
pub use turn_server::{TurnRelay, TurnRelayConfig};
