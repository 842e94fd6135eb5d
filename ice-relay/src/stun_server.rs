//! STUN binding responder
//!
//! A best-effort local STUN service: one UDP socket answering binding
//! requests with the sender's reflexive address. No authentication, no
//! state. Bind failure is reported to the caller and is not fatal to the
//! process; clients can still use a public STUN endpoint.
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
use crate::message::{StunClass, StunMessage, StunMethod};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 1500;

/// Handle to a running STUN responder
///
/// Dropping the handle (or cancelling the token it was started with)
/// stops the responder task and releases the socket.
#[derive(Debug)]
pub struct StunRelay {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl StunRelay {
    /// Bind `bind_addr` and start answering binding requests
    pub async fn start(bind_addr: SocketAddr, shutdown: CancellationToken) -> RelayResult<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| RelayError::BindFailed {
                addr: bind_addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = socket.local_addr().map_err(|e| RelayError::BindFailed {
            addr: bind_addr.to_string(),
            reason: e.to_string(),
        })?;

        info!(addr = %local_addr, "STUN listening");

        let socket = Arc::new(socket);
        let task = tokio::spawn(serve(socket, shutdown));

        Ok(StunRelay { local_addr, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for StunRelay {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: Arc<UdpSocket>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("STUN responder shutting down");
                return;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "STUN recv error");
                    continue;
                }
            },
        };

        if let Some(response) = binding_response(&buf[..len], from) {
            if let Err(e) = socket.send_to(&response, from).await {
                warn!(error = %e, client = %from, "STUN send error");
            }
        }
    }
}

/// Build a binding success response, or `None` for anything else
fn binding_response(data: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
    if !StunMessage::is_stun(data) {
        return None;
    }
    let request = match StunMessage::decode(data) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, client = %from, "Discarding malformed STUN datagram");
            return None;
        }
    };
    if request.class != StunClass::Request || request.method != StunMethod::Binding {
        return None;
    }

    let mut response = StunMessage::response_to(&request, StunClass::SuccessResponse);
    response.add_xor_mapped_address(from);
    Some(response.encode())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ATTR_XOR_MAPPED_ADDRESS;

    #[tokio::test]
    async fn test_answers_binding_request() {
        let shutdown = CancellationToken::new();
        let relay = StunRelay::start("127.0.0.1:0".parse().unwrap(), shutdown.clone())
            .await
            .unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let request = StunMessage::new(StunClass::Request, StunMethod::Binding);
        client
            .send_to(&request.encode(), relay.local_addr())
            .await
            .unwrap();

        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            client.recv_from(&mut buf),
        )
        .await
        .unwrap()
        .unwrap();

        let response = StunMessage::decode(&buf[..len]).unwrap();
        assert_eq!(response.class, StunClass::SuccessResponse);
        assert_eq!(response.transaction_id, request.transaction_id);
        assert_eq!(
            response.xor_address(ATTR_XOR_MAPPED_ADDRESS),
            Some(client.local_addr().unwrap())
        );

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let shutdown = CancellationToken::new();
        let first = StunRelay::start("127.0.0.1:0".parse().unwrap(), shutdown.clone())
            .await
            .unwrap();

        let err = StunRelay::start(first.local_addr(), shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::BindFailed { .. }));
    }

    #[test]
    fn test_ignores_non_binding_traffic() {
        let from = "127.0.0.1:40000".parse().unwrap();
        assert!(binding_response(b"plain udp payload", from).is_none());

        let indication = StunMessage::new(StunClass::Indication, StunMethod::Binding);
        assert!(binding_response(&indication.encode(), from).is_none());
    }
}
