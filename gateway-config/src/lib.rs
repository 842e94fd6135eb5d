//! Configuration management for the RTC gateway
//!
//! Everything the process consumes at its boundary lives here: relay
//! endpoint descriptors, the typed HTTP control-surface options, signaling
//! engine options and the stream-name to media-URL map. The HTTP options
//! are a typed structure with explicit defaults; they are flattened to the
//! ordered key/value list the HTTP collaborator expects only at that
//! boundary (`HttpOptions::to_option_list`).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Public STUN endpoint used when no other is configured
pub const DEFAULT_STUN_URL: &str = "stun.l.google.com:19302";
/// Default bind address for a locally hosted STUN responder
pub const DEFAULT_LOCAL_STUN_BIND: &str = "0.0.0.0:3478";
/// Default descriptor for a locally hosted TURN relay
pub const DEFAULT_LOCAL_TURN_DESCRIPTOR: &str = "turn:turn@0.0.0.0:3478";
/// Sentinel value disabling the STUN entry of the ICE server list
pub const STUN_DISABLED_SENTINEL: &str = "-";

/// Relay endpoint configuration
///
/// `stun_url`/`turn_url` are the endpoints advertised to clients through
/// the ICE server list; `local_stun_url`/`local_turn_url`, when present,
/// ask the gateway to host the corresponding relay itself.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayEndpoints {
    pub stun_url: String,
    pub turn_url: String,
    pub local_stun_url: Option<String>,
    pub local_turn_url: Option<String>,
    pub udp_port_range: String,
}

impl Default for RelayEndpoints {
    fn default() -> Self {
        RelayEndpoints {
            stun_url: DEFAULT_STUN_URL.to_string(),
            turn_url: String::new(),
            local_stun_url: None,
            local_turn_url: None,
            udp_port_range: "0:65535".to_string(),
        }
    }
}

/// Typed HTTP control-surface options
///
/// Directory listing and URL decoding are always off and are not
/// configurable; the remaining options carry explicit defaults matching
/// the gateway's historical behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpOptions {
    /// Address the HTTP surface listens on, `host:port`
    pub listening_address: String,
    /// Static document root served next to the API
    pub document_root: String,
    /// `Access-Control-Allow-Origin` value
    pub access_control_allow_origin: String,
    /// Keep-alive timeout in milliseconds
    pub keep_alive_timeout_ms: u32,
    /// Suppress the `X-Frame-Options: SAMEORIGIN` header
    pub disable_xframe_options: bool,
    /// TLS certificate path, when serving HTTPS
    pub ssl_certificate: Option<String>,
    /// Worker thread count forwarded to the HTTP collaborator
    pub num_threads: Option<u32>,
    /// htpasswd-style global auth file
    pub global_auth_file: Option<String>,
    /// Digest authentication domain
    pub authentication_domain: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        HttpOptions {
            listening_address: "0.0.0.0:9990".to_string(),
            document_root: "./www".to_string(),
            access_control_allow_origin: "*".to_string(),
            keep_alive_timeout_ms: 1000,
            disable_xframe_options: false,
            ssl_certificate: None,
            num_threads: None,
            global_auth_file: None,
            authentication_domain: "mydomain.com".to_string(),
        }
    }
}

impl HttpOptions {
    /// Flatten to the ordered key/value list the HTTP collaborator expects
    ///
    /// The ordering is part of the collaborator contract: fixed options
    /// first, then the conditionally present ones.
    pub fn to_option_list(&self) -> Vec<(String, String)> {
        let mut options = Vec::new();
        let mut push = |k: &str, v: &str| options.push((k.to_string(), v.to_string()));

        push("document_root", &self.document_root);
        push("enable_directory_listing", "no");
        if !self.disable_xframe_options {
            push("additional_header", "X-Frame-Options: SAMEORIGIN");
        }
        push("access_control_allow_origin", &self.access_control_allow_origin);
        push("listening_ports", &self.listening_address);
        push("enable_keep_alive", "yes");
        push("keep_alive_timeout_ms", &self.keep_alive_timeout_ms.to_string());
        push("decode_url", "no");
        if let Some(ref cert) = self.ssl_certificate {
            push("ssl_certificate", cert);
        }
        if let Some(threads) = self.num_threads {
            push("num_threads", &threads.to_string());
        }
        if let Some(ref auth_file) = self.global_auth_file {
            push("global_auth_file", auth_file);
            push("authentication_domain", &self.authentication_domain);
        }

        options
    }
}

/// Audio backend selector forwarded to the signaling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AudioLayer {
    PlatformDefault,
    Dummy,
}

/// ICE transport restriction forwarded to the signaling engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IceTransportPolicy {
    All,
    Relay,
    NoHost,
    None,
}

impl IceTransportPolicy {
    fn from_index(index: u32) -> Self {
        match index {
            1 => IceTransportPolicy::Relay,
            2 => IceTransportPolicy::NoHost,
            3 => IceTransportPolicy::None,
            _ => IceTransportPolicy::All,
        }
    }
}

/// Options consumed opaquely by the signaling engine
#[derive(Debug, Clone, Deserialize)]
pub struct SignalingOptions {
    pub audio_layer: AudioLayer,
    pub publish_filter: String,
    pub use_null_codec: bool,
    pub use_plan_b: bool,
    pub max_connections: u32,
    pub transport: IceTransportPolicy,
    pub field_trials: String,
}

impl Default for SignalingOptions {
    fn default() -> Self {
        SignalingOptions {
            audio_layer: AudioLayer::PlatformDefault,
            publish_filter: ".*".to_string(),
            use_null_codec: false,
            use_plan_b: false,
            max_connections: 0,
            transport: IceTransportPolicy::All,
            field_trials: "WebRTC-FrameDropper/Disabled/".to_string(),
        }
    }
}

/// Media URLs published under one stream name
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StreamUrls {
    pub video: Option<String>,
    pub audio: Option<String>,
}

/// Stream-name to media-URL mapping, keyed in a stable order
pub type StreamMap = BTreeMap<String, StreamUrls>;

/// Top level gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    pub relay: RelayEndpoints,
    pub http: HttpOptions,
    pub signaling: SignalingOptions,
    pub streams: StreamMap,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let mut relay = RelayEndpoints {
            stun_url: env::var("GATEWAY_STUN_URL")
                .unwrap_or_else(|_| DEFAULT_STUN_URL.to_string()),
            turn_url: env::var("GATEWAY_TURN_URL").unwrap_or_default(),
            local_stun_url: env::var("GATEWAY_LOCAL_STUN_URL")
                .ok()
                .map(|v| non_empty_or(v, DEFAULT_LOCAL_STUN_BIND)),
            local_turn_url: env::var("GATEWAY_LOCAL_TURN_URL")
                .ok()
                .map(|v| non_empty_or(v, DEFAULT_LOCAL_TURN_DESCRIPTOR)),
            udp_port_range: env::var("GATEWAY_UDP_PORT_RANGE")
                .unwrap_or_else(|_| "0:65535".to_string()),
        };
        // A locally hosted TURN relay is also the advertised TURN endpoint
        // unless one was given explicitly.
        if relay.turn_url.is_empty() {
            if let Some(ref local) = relay.local_turn_url {
                relay.turn_url = local.clone();
            }
        }

        let http_port = env::var("PORT").unwrap_or_else(|_| "9990".to_string());
        let http = HttpOptions {
            listening_address: env::var("GATEWAY_HTTP_ADDRESS")
                .unwrap_or_else(|_| format!("0.0.0.0:{}", http_port)),
            document_root: env::var("GATEWAY_WEBROOT")
                .unwrap_or_else(|_| "./www".to_string()),
            disable_xframe_options: flag_from_env("GATEWAY_DISABLE_XFRAME_OPTIONS"),
            ssl_certificate: env::var("GATEWAY_SSL_CERTIFICATE").ok(),
            num_threads: parse_from_env("GATEWAY_NUM_THREADS"),
            global_auth_file: env::var("GATEWAY_AUTH_FILE").ok(),
            authentication_domain: env::var("GATEWAY_AUTH_DOMAIN")
                .unwrap_or_else(|_| "mydomain.com".to_string()),
            ..HttpOptions::default()
        };

        let signaling = SignalingOptions {
            publish_filter: env::var("GATEWAY_PUBLISH_FILTER")
                .unwrap_or_else(|_| ".*".to_string()),
            use_null_codec: flag_from_env("GATEWAY_NULL_CODEC"),
            use_plan_b: flag_from_env("GATEWAY_PLAN_B"),
            max_connections: parse_from_env("GATEWAY_MAX_CONNECTIONS").unwrap_or(0),
            transport: IceTransportPolicy::from_index(
                parse_from_env("GATEWAY_ICE_TRANSPORT").unwrap_or(0),
            ),
            audio_layer: if flag_from_env("GATEWAY_DUMMY_AUDIO") {
                AudioLayer::Dummy
            } else {
                AudioLayer::PlatformDefault
            },
            field_trials: env::var("GATEWAY_FIELD_TRIALS")
                .unwrap_or_else(|_| "WebRTC-FrameDropper/Disabled/".to_string()),
        };

        let streams = match env::var("GATEWAY_STREAMS_FILE") {
            Ok(path) => load_stream_map(Path::new(&path))?,
            Err(_) => StreamMap::new(),
        };

        Ok(Self {
            relay,
            http,
            signaling,
            streams,
            log_level: env::var("LOG_LEVEL").ok(),
            log_format: env::var("LOG_FORMAT").ok(),
        })
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

/// Load the stream-name to media-URL map from a JSON config file
///
/// The file carries a top level `urls` object:
/// `{"urls": {"cam1": {"video": "rtsp://...", "audio": "..."}}}`.
pub fn load_stream_map(path: &Path) -> Result<StreamMap, config::ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        config::ConfigError::Message(format!(
            "Cannot read streams file {}: {}",
            path.display(),
            e
        ))
    })?;

    #[derive(Deserialize)]
    struct StreamsFile {
        #[serde(default)]
        urls: StreamMap,
    }

    let parsed: StreamsFile = serde_json::from_str(&raw).map_err(|e| {
        config::ConfigError::Message(format!(
            "Malformed streams file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parsed.urls)
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

fn flag_from_env(key: &str) -> bool {
    matches!(
        env::var(key).as_deref(),
        Ok("1") | Ok("true") | Ok("yes") | Ok("on")
    )
}

fn parse_from_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_http_options_default_list() {
        let options = HttpOptions::default().to_option_list();

        let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "document_root",
                "enable_directory_listing",
                "additional_header",
                "access_control_allow_origin",
                "listening_ports",
                "enable_keep_alive",
                "keep_alive_timeout_ms",
                "decode_url",
            ]
        );

        let lookup = |key: &str| {
            options
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(lookup("enable_directory_listing"), Some("no"));
        assert_eq!(lookup("decode_url"), Some("no"));
        assert_eq!(lookup("additional_header"), Some("X-Frame-Options: SAMEORIGIN"));
        assert_eq!(lookup("keep_alive_timeout_ms"), Some("1000"));
    }

    #[test]
    fn test_http_options_xframe_disabled() {
        let options = HttpOptions {
            disable_xframe_options: true,
            ..HttpOptions::default()
        };
        let list = options.to_option_list();
        assert!(!list.iter().any(|(k, _)| k == "additional_header"));
    }

    #[test]
    fn test_http_options_auth_pair() {
        let options = HttpOptions {
            global_auth_file: Some("/etc/gateway/htpasswd".to_string()),
            authentication_domain: "relay.example.com".to_string(),
            num_threads: Some(4),
            ..HttpOptions::default()
        };
        let list = options.to_option_list();

        let position = |key: &str| list.iter().position(|(k, _)| k == key);
        // The auth domain only follows a configured auth file.
        assert!(position("global_auth_file").unwrap() < position("authentication_domain").unwrap());
        assert_eq!(
            list.iter().find(|(k, _)| k == "num_threads").map(|(_, v)| v.as_str()),
            Some("4")
        );
    }

    #[test]
    fn test_load_stream_map() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"urls": {{"cam1": {{"video": "rtsp://cam1/stream"}}, "mic1": {{"audio": "pulse:default"}}}}}}"#
        )
        .unwrap();

        let streams = load_stream_map(file.path()).unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(
            streams["cam1"].video.as_deref(),
            Some("rtsp://cam1/stream")
        );
        assert_eq!(streams["mic1"].audio.as_deref(), Some("pulse:default"));
        assert_eq!(streams["mic1"].video, None);
    }

    #[test]
    fn test_ice_transport_from_index() {
        assert_eq!(IceTransportPolicy::from_index(0), IceTransportPolicy::All);
        assert_eq!(IceTransportPolicy::from_index(1), IceTransportPolicy::Relay);
        assert_eq!(IceTransportPolicy::from_index(2), IceTransportPolicy::NoHost);
        assert_eq!(IceTransportPolicy::from_index(3), IceTransportPolicy::None);
        assert_eq!(IceTransportPolicy::from_index(42), IceTransportPolicy::All);
    }
}
