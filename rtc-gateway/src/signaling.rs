//! Signaling engine boundary
//!
//! The peer-connection/media-negotiation engine is an external
//! collaborator: the gateway hands it the ICE server list and the stream
//! map at construction, asks it to initialize, and exposes its
//! route-name to handler table over the HTTP surface. Media transport,
//! SDP and codec logic all live behind this boundary.
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


use gateway_config::{SignalingOptions, StreamMap};
use ice_relay::IceServerList;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything the signaling engine is constructed with
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    pub ice_servers: IceServerList,
    pub streams: StreamMap,
    pub options: SignalingOptions,
    pub udp_port_range: String,
}

/// One HTTP API request as the engine sees it
#[derive(Debug, Clone, Default)]
pub struct ApiRequest {
    pub route: String,
    pub query: HashMap<String, String>,
    pub body: Value,
}

/// Route handler supplied by the engine
pub type ApiHandler = Arc<dyn Fn(ApiRequest) -> Value + Send + Sync>;

/// Route-name to handler mapping exposed over the HTTP surface
pub type ApiTable = HashMap<String, ApiHandler>;

/// External signaling collaborator
pub trait SignalingEngine: Send {
    /// One-time engine initialization; `false` is fatal to the process
    /// before any relay or HTTP listener starts
    fn initialize(&mut self) -> bool;

    /// The engine's HTTP API, consumed by the control surface
    fn http_api(&self) -> ApiTable;
}

/// Placeholder engine serving static data derived from its construction
///
/// Stands in for a full peer-connection engine: answers the discovery
/// routes (`getIceServers`, `getMediaList`, `version`) from the
/// `SignalingConfig` it was built with and accepts no sessions.
pub struct StaticSignalingEngine {
    config: SignalingConfig,
    initialized: bool,
}

impl StaticSignalingEngine {
    pub fn new(config: SignalingConfig) -> Self {
        StaticSignalingEngine {
            config,
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl SignalingEngine for StaticSignalingEngine {
    fn initialize(&mut self) -> bool {
        self.initialized = true;
        true
    }

    fn http_api(&self) -> ApiTable {
        let mut table: ApiTable = HashMap::new();

        let ice_servers = self.config.ice_servers.uris();
        table.insert(
            "getIceServers".to_string(),
            Arc::new(move |_req| json!({ "iceServers": ice_servers })),
        );

        let media: Vec<Value> = self
            .config
            .streams
            .iter()
            .map(|(name, urls)| {
                json!({
                    "name": name,
                    "video": urls.video,
                    "audio": urls.audio,
                })
            })
            .collect();
        table.insert(
            "getMediaList".to_string(),
            Arc::new(move |_req| Value::Array(media.clone())),
        );

        table.insert(
            "version".to_string(),
            Arc::new(|_req| json!({ "version": env!("CARGO_PKG_VERSION") })),
        );

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::StreamUrls;

    fn test_config() -> SignalingConfig {
        let mut streams = StreamMap::new();
        streams.insert(
            "cam1".to_string(),
            StreamUrls {
                video: Some("rtsp://cam1/stream".to_string()),
                audio: None,
            },
        );
        SignalingConfig {
            ice_servers: IceServerList::build("stun.example.com:19302", ""),
            streams,
            options: SignalingOptions::default(),
            udp_port_range: "0:65535".to_string(),
        }
    }

    #[test]
    fn test_static_engine_initializes() {
        let mut engine = StaticSignalingEngine::new(test_config());
        assert!(!engine.is_initialized());
        assert!(engine.initialize());
        assert!(engine.is_initialized());
    }

    #[test]
    fn test_api_table_routes() {
        let mut engine = StaticSignalingEngine::new(test_config());
        engine.initialize();
        let table = engine.http_api();

        assert!(table.contains_key("getIceServers"));
        assert!(table.contains_key("getMediaList"));
        assert!(table.contains_key("version"));

        let ice = table["getIceServers"](ApiRequest::default());
        assert_eq!(
            ice["iceServers"],
            json!(["stun:stun.example.com:19302"])
        );

        let media = table["getMediaList"](ApiRequest::default());
        assert_eq!(media[0]["name"], "cam1");
        assert_eq!(media[0]["video"], "rtsp://cam1/stream");
    }
}
