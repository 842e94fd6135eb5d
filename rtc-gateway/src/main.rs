//! RTC gateway entry point
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


use gateway_config::GatewayConfig;
use gateway_logging::{init_logging, LogFormat};
use rtc_gateway::{LifecycleCoordinator, StaticSignalingEngine};
use std::process::ExitCode;
use tracing::{error, info};

// Control traffic is light; one cooperative loop is enough.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let format = config
        .log_format
        .as_deref()
        .map(LogFormat::from_name)
        .unwrap_or(LogFormat::Console);
    init_logging("rtc-gateway", config.log_level(), format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting RTC gateway");
    if config.streams.is_empty() {
        info!("No preconfigured streams");
    } else {
        info!(streams = config.streams.len(), "Preconfigured streams loaded");
    }

    let coordinator = LifecycleCoordinator::new();
    match coordinator
        .run(config, |signaling| {
            Box::new(StaticSignalingEngine::new(signaling))
        })
        .await
    {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Gateway exited with failure");
            ExitCode::FAILURE
        }
    }
}
