//! Control plane for the RTC gateway
//!
//! Ties the relay core, the configuration layer and the external
//! signaling engine into one supervised process: the lifecycle
//! coordinator owns startup order, the run loop and reverse-order
//! teardown; the HTTP surface exposes the engine's API routes and the
//! static document root.
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


pub mod error;
pub mod http;
pub mod lifecycle;
pub mod signaling;

pub use error::{GatewayError, GatewayResult};
pub use http::HttpSurface;
pub use lifecycle::{LifecycleCoordinator, RunState};
pub use signaling::{
    ApiHandler, ApiRequest, ApiTable, SignalingConfig, SignalingEngine, StaticSignalingEngine,
};
