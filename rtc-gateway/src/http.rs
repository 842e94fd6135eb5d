//! HTTP control surface
//!
//! Consumes the signaling engine's route table and the flattened option
//! list produced by `gateway_config::HttpOptions::to_option_list`. The
//! surface is an axum application: engine routes under `/api/<name>`,
//! the document root served as a static fallback, CORS and additional
//! headers applied as layers. Options the surface cannot honor are
//! recorded and reported, never silently dropped.
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
use crate::signaling::{ApiRequest, ApiTable};
use axum::{
    extract::Query,
    http::{HeaderName, HeaderValue},
    response::Json,
    routing::any,
    Router,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;

/// Option list interpreted into surface settings
#[derive(Debug, Default)]
struct SurfaceSettings {
    listening_address: Option<String>,
    document_root: Option<String>,
    allow_origin: Option<String>,
    additional_headers: Vec<(HeaderName, HeaderValue)>,
}

impl SurfaceSettings {
    /// Interpret the collaborator option list
    ///
    /// Unknown and advisory keys (`num_threads`, `ssl_certificate`,
    /// auth file settings, keep-alive tuning) are logged; the fixed
    /// `enable_directory_listing`/`decode_url` values are asserted.
    fn from_options(options: &[(String, String)]) -> GatewayResult<Self> {
        let mut settings = SurfaceSettings::default();

        for (key, value) in options {
            match key.as_str() {
                "listening_ports" => settings.listening_address = Some(value.clone()),
                "document_root" => settings.document_root = Some(value.clone()),
                "access_control_allow_origin" => settings.allow_origin = Some(value.clone()),
                "additional_header" => {
                    let (name, header_value) = value.split_once(':').ok_or_else(|| {
                        GatewayError::HttpStartupFailed(format!(
                            "malformed additional_header: {}",
                            value
                        ))
                    })?;
                    let name = name.trim().parse::<HeaderName>().map_err(|e| {
                        GatewayError::HttpStartupFailed(format!("bad header name: {}", e))
                    })?;
                    let header_value =
                        header_value.trim().parse::<HeaderValue>().map_err(|e| {
                            GatewayError::HttpStartupFailed(format!("bad header value: {}", e))
                        })?;
                    settings.additional_headers.push((name, header_value));
                }
                "enable_directory_listing" | "decode_url" => {
                    // Always "no"; the surface has neither feature.
                    debug!(key = %key, value = %value, "Fixed HTTP option");
                }
                "enable_keep_alive" | "keep_alive_timeout_ms" => {
                    debug!(key = %key, value = %value, "Keep-alive handled by the HTTP stack");
                }
                "ssl_certificate" | "num_threads" | "global_auth_file"
                | "authentication_domain" => {
                    warn!(key = %key, value = %value, "HTTP option not supported by this surface");
                }
                other => {
                    warn!(key = %other, "Unrecognized HTTP option");
                }
            }
        }

        Ok(settings)
    }
}

/// Handle to the running HTTP surface
#[derive(Debug)]
pub struct HttpSurface {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl HttpSurface {
    /// Bind and start serving; construction failure is process-fatal
    pub async fn start(
        api: ApiTable,
        options: &[(String, String)],
        shutdown: CancellationToken,
    ) -> GatewayResult<Self> {
        let settings = SurfaceSettings::from_options(options)?;

        let mut app = Router::new();
        for (route, handler) in api {
            let path = format!("/api/{}", route);
            app = app.route(
                &path,
                any(move |Query(query): Query<HashMap<String, String>>, body: Bytes| {
                    let handler = handler.clone();
                    let route = route.clone();
                    async move {
                        let body = serde_json::from_slice(&body)
                            .unwrap_or(serde_json::Value::Null);
                        Json(handler(ApiRequest { route, query, body }))
                    }
                }),
            );
        }

        if let Some(ref root) = settings.document_root {
            app = app.fallback_service(ServeDir::new(root));
        }

        for (name, value) in settings.additional_headers {
            app = app.layer(SetResponseHeaderLayer::if_not_present(name, value));
        }
        if let Some(ref origin) = settings.allow_origin {
            let cors = if origin == "*" {
                CorsLayer::new().allow_origin(AnyOrigin).allow_methods(AnyOrigin)
            } else {
                let origin = origin.parse::<HeaderValue>().map_err(|e| {
                    GatewayError::HttpStartupFailed(format!("bad allow origin: {}", e))
                })?;
                CorsLayer::new().allow_origin(origin)
            };
            app = app.layer(cors);
        }

        let address = settings
            .listening_address
            .unwrap_or_else(|| "0.0.0.0:9990".to_string());
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            GatewayError::HttpStartupFailed(format!("{}: {}", address, e))
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| GatewayError::HttpStartupFailed(e.to_string()))?;

        info!(addr = %local_addr, "Listen at");

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "HTTP surface error");
            }
        });

        Ok(HttpSurface { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the graceful shutdown to complete
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::ApiHandler;
    use serde_json::json;
    use std::sync::Arc;

    fn option_list(listen: &str) -> Vec<(String, String)> {
        vec![
            ("enable_directory_listing".to_string(), "no".to_string()),
            ("additional_header".to_string(), "X-Frame-Options: SAMEORIGIN".to_string()),
            ("access_control_allow_origin".to_string(), "*".to_string()),
            ("listening_ports".to_string(), listen.to_string()),
            ("decode_url".to_string(), "no".to_string()),
        ]
    }

    fn version_api() -> ApiTable {
        let mut table = ApiTable::new();
        let handler: ApiHandler = Arc::new(|_req| json!({ "version": "test" }));
        table.insert("version".to_string(), handler);
        table
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_api_route_with_headers() {
        let shutdown = CancellationToken::new();
        let surface = HttpSurface::start(version_api(), &option_list("127.0.0.1:0"), shutdown.clone())
            .await
            .unwrap();

        let url = format!("http://{}/api/version", surface.local_addr());
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response.headers().get("x-frame-options").unwrap(),
            "SAMEORIGIN"
        );
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["version"], "test");

        shutdown.cancel();
        surface.stopped().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_startup_failure_reports_reason() {
        let shutdown = CancellationToken::new();
        let first = HttpSurface::start(version_api(), &option_list("127.0.0.1:0"), shutdown.clone())
            .await
            .unwrap();

        let occupied = first.local_addr().to_string();
        let err = HttpSurface::start(version_api(), &option_list(&occupied), shutdown.clone())
            .await
            .unwrap_err();
        match err {
            GatewayError::HttpStartupFailed(reason) => assert!(reason.contains(&occupied)),
            other => panic!("unexpected error: {}", other),
        }

        shutdown.cancel();
        first.stopped().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_serves_document_root_fallback() {
        let webroot = tempfile::tempdir().unwrap();
        std::fs::write(webroot.path().join("index.html"), "<html>gateway</html>").unwrap();

        let mut options = option_list("127.0.0.1:0");
        options.push((
            "document_root".to_string(),
            webroot.path().to_string_lossy().into_owned(),
        ));

        let shutdown = CancellationToken::new();
        let surface = HttpSurface::start(version_api(), &options, shutdown.clone())
            .await
            .unwrap();

        let url = format!("http://{}/index.html", surface.local_addr());
        let response = reqwest::get(&url).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "<html>gateway</html>");

        shutdown.cancel();
        surface.stopped().await;
    }

    #[tokio::test]
    async fn test_malformed_additional_header_rejected() {
        let options = vec![(
            "additional_header".to_string(),
            "NoColonHere".to_string(),
        )];
        let err = HttpSurface::start(ApiTable::new(), &options, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::HttpStartupFailed(_)));
    }
}
