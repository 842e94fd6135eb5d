//! Gateway lifecycle coordination
//!
//! Owns the run loop: builds the ICE server list, brings up the
//! signaling engine, the HTTP control surface and the optional local
//! STUN/TURN relays in that order, then parks until interrupted and
//! tears everything down in reverse. The signaling engine must be
//! known-good before any network-facing relay socket is opened.
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


use crate::error::{GatewayError, GatewayResult};
use crate::http::HttpSurface;
use crate::signaling::{SignalingConfig, SignalingEngine};
use gateway_config::GatewayConfig;
use ice_relay::{
    AlwaysRedirect, IceServerList, RelayDescriptor, SelfProvisionedAuth, StunRelay, TurnRelay,
    TurnRelayConfig,
};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Coordinator run states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// The lifecycle coordinator
///
/// The cancellation token is the only shutdown path: the interrupt
/// handler and tests merely trip it; teardown always happens on the loop
/// after `run` observes the cancellation.
pub struct LifecycleCoordinator {
    shutdown: CancellationToken,
    state_tx: watch::Sender<RunState>,
}

impl LifecycleCoordinator {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(RunState::Initializing);
        LifecycleCoordinator {
            shutdown: CancellationToken::new(),
            state_tx,
        }
    }

    /// Token tripping the run loop; safe to cancel from anywhere
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Observe run state transitions
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state_tx.subscribe()
    }

    fn transition(&self, state: RunState) {
        info!(state = ?state, "Run state");
        let _ = self.state_tx.send(state);
    }

    /// Run the gateway until interrupted
    ///
    /// `make_engine` receives the assembled signaling configuration and
    /// produces the external engine; the coordinator owns everything
    /// from there.
    pub async fn run<F>(self, config: GatewayConfig, make_engine: F) -> GatewayResult<()>
    where
        F: FnOnce(SignalingConfig) -> Box<dyn SignalingEngine>,
    {
        self.transition(RunState::Initializing);

        // 1. ICE server list, handed to the engine at construction.
        let ice_servers =
            IceServerList::build(&config.relay.stun_url, &config.relay.turn_url);
        info!(servers = ?ice_servers.uris(), "ICE server list");

        let mut engine = make_engine(SignalingConfig {
            ice_servers,
            streams: config.streams.clone(),
            options: config.signaling.clone(),
            udp_port_range: config.relay.udp_port_range.clone(),
        });

        // 2. A broken engine makes relays useless; nothing gets bound.
        if !engine.initialize() {
            error!("Cannot initialize signaling engine");
            self.transition(RunState::Stopped);
            return Err(GatewayError::SignalingInitFailed);
        }

        // 3. HTTP control surface, before any relay socket.
        let http = match HttpSurface::start(
            engine.http_api(),
            &config.http.to_option_list(),
            self.shutdown.clone(),
        )
        .await
        {
            Ok(surface) => surface,
            Err(e) => {
                error!(error = %e, "Cannot start HTTP surface");
                self.transition(RunState::Stopped);
                return Err(e);
            }
        };

        // 4. Optional local STUN responder, best effort.
        let stun = match config.relay.local_stun_url.as_deref() {
            Some(descriptor) => start_stun(descriptor, self.shutdown.clone()).await,
            None => None,
        };

        // 5. Optional local TURN relay, best effort.
        let turn = match config.relay.local_turn_url.as_deref() {
            Some(descriptor) => {
                start_turn(descriptor, &config.relay.turn_url, self.shutdown.clone()).await
            }
            None => None,
        };

        self.transition(RunState::Running);

        // 6-7. Interrupt handler and run loop. The signal path only trips
        // the token; teardown stays on this task.
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
            }
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("SIGINT"),
                    Err(e) => error!(error = %e, "Unable to listen for shutdown signal"),
                }
            }
        }

        // 8. Reverse-order teardown: relays, HTTP surface, engine.
        self.transition(RunState::ShuttingDown);
        self.shutdown.cancel();
        drop(turn);
        drop(stun);
        http.stopped().await;
        drop(engine);

        self.transition(RunState::Stopped);
        info!("Exit");
        Ok(())
    }
}

impl Default for LifecycleCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the local STUN responder; failure leaves it absent for the run
async fn start_stun(descriptor: &str, shutdown: CancellationToken) -> Option<StunRelay> {
    let parsed = match RelayDescriptor::parse(descriptor) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(descriptor = %descriptor, error = %e, "Invalid STUN bind descriptor");
            return None;
        }
    };

    match StunRelay::start(parsed.address, shutdown).await {
        Ok(relay) => Some(relay),
        Err(e) => {
            warn!(error = %e, "STUN responder unavailable");
            None
        }
    }
}

/// Start the local TURN relay; failure leaves it absent for the run
///
/// The bind descriptor and the externally advertised descriptor are
/// independent strings and are parsed separately.
async fn start_turn(
    local_descriptor: &str,
    external_descriptor: &str,
    shutdown: CancellationToken,
) -> Option<TurnRelay> {
    let local = match RelayDescriptor::parse(local_descriptor) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(descriptor = %local_descriptor, error = %e, "Invalid TURN bind descriptor");
            return None;
        }
    };
    let external = match RelayDescriptor::parse(external_descriptor) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(descriptor = %external_descriptor, error = %e, "Invalid TURN external descriptor");
            return None;
        }
    };

    let turn_config = TurnRelayConfig::new(local.address, external.address);
    let redirect = Arc::new(AlwaysRedirect {
        target: external.address,
    });
    match TurnRelay::start(
        turn_config,
        Arc::new(SelfProvisionedAuth),
        redirect,
        shutdown,
    )
    .await
    {
        Ok(relay) => Some(relay),
        Err(e) => {
            warn!(error = %e, "TURN relay unavailable");
            None
        }
    }
}
