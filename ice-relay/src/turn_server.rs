//! Authenticated TURN relay
//!
//! Client-facing relay control traffic arrives over one TCP listener and
//! one UDP socket, both bound to the internal address; relayed-media
//! sockets are created on demand in the external address family with an
//! ephemeral port. The two internal sockets are independently fallible:
//! either can be missing and the relay runs with the remaining transport.
//!
//! Every Allocate request passes through the auth hook (long-term
//! credential MESSAGE-INTEGRITY) and the redirect policy before a relay
//! socket is reserved.
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


use crate::allocation::AllocationTable;
use crate::credentials::TurnAuthHandler;
use crate::error::{RelayError, RelayResult};
use crate::message::{
    StunClass, StunMessage, StunMethod, ATTR_DATA, ATTR_NONCE, ATTR_REALM, ATTR_XOR_PEER_ADDRESS,
};
use crate::redirect::RedirectPolicy;
use bytes::Bytes;
use rand::Rng;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 1500;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// TURN relay configuration
#[derive(Debug, Clone)]
pub struct TurnRelayConfig {
    /// Internal bind address for client-facing control traffic
    pub bind_addr: SocketAddr,
    /// Externally advertised relay address; its family and IP seed the
    /// relayed-media socket factory
    pub external_addr: SocketAddr,
    /// Authentication realm
    pub realm: String,
    /// Upper bound on concurrent allocations
    pub max_allocations: usize,
}

impl TurnRelayConfig {
    pub fn new(bind_addr: SocketAddr, external_addr: SocketAddr) -> Self {
        TurnRelayConfig {
            bind_addr,
            external_addr,
            realm: "rtc-gateway".to_string(),
            max_allocations: 1000,
        }
    }
}

/// Handle to a running TURN relay
pub struct TurnRelay {
    bind_addr: SocketAddr,
    external_addr: SocketAddr,
    tcp_enabled: bool,
    udp_enabled: bool,
    state: Arc<TurnState>,
    tasks: Vec<JoinHandle<()>>,
}

/// Shared relay state; hooks are stateless lookups, reentrant per request
struct TurnState {
    auth: Arc<dyn TurnAuthHandler>,
    redirect: Arc<dyn RedirectPolicy>,
    realm: String,
    nonce: String,
    external_ip: IpAddr,
    advertised_addr: SocketAddr,
    allocations: Mutex<AllocationTable>,
}

impl TurnRelay {
    /// Bind sockets and start serving
    ///
    /// TCP and UDP binds are each best-effort: a failure is logged and
    /// the relay continues with the other transport. Only when both fail
    /// is there nothing left to run and an error is returned.
    pub async fn start(
        config: TurnRelayConfig,
        auth: Arc<dyn TurnAuthHandler>,
        redirect: Arc<dyn RedirectPolicy>,
        shutdown: CancellationToken,
    ) -> RelayResult<Self> {
        let nonce: String = {
            let mut rng = rand::thread_rng();
            (0..16).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
        };

        let state = Arc::new(TurnState {
            auth,
            redirect,
            realm: config.realm.clone(),
            nonce,
            external_ip: config.external_addr.ip(),
            advertised_addr: config.external_addr,
            allocations: Mutex::new(AllocationTable::new(config.max_allocations)),
        });

        let mut tasks = Vec::new();

        let tcp_enabled = match TcpListener::bind(config.bind_addr).await {
            Ok(listener) => {
                info!(addr = %config.bind_addr, "TURN listening TCP");
                tasks.push(tokio::spawn(serve_tcp(
                    listener,
                    state.clone(),
                    shutdown.clone(),
                )));
                true
            }
            Err(e) => {
                warn!(addr = %config.bind_addr, error = %e, "Failed to create TURN TCP server socket");
                false
            }
        };

        let udp_enabled = match UdpSocket::bind(config.bind_addr).await {
            Ok(socket) => {
                info!(addr = %config.bind_addr, "TURN listening UDP");
                tasks.push(tokio::spawn(serve_udp(
                    Arc::new(socket),
                    state.clone(),
                    shutdown.clone(),
                )));
                true
            }
            Err(e) => {
                warn!(addr = %config.bind_addr, error = %e, "Failed to create TURN UDP server socket");
                false
            }
        };

        if !tcp_enabled && !udp_enabled {
            return Err(RelayError::BindFailed {
                addr: config.bind_addr.to_string(),
                reason: "neither TCP nor UDP could bind".to_string(),
            });
        }

        info!(addr = %config.external_addr, "TURN external addr");

        tasks.push(tokio::spawn(cleanup_loop(state.clone(), shutdown)));

        Ok(TurnRelay {
            bind_addr: config.bind_addr,
            external_addr: config.external_addr,
            tcp_enabled,
            udp_enabled,
            state,
            tasks,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn external_addr(&self) -> SocketAddr {
        self.external_addr
    }

    pub fn tcp_enabled(&self) -> bool {
        self.tcp_enabled
    }

    pub fn udp_enabled(&self) -> bool {
        self.udp_enabled
    }

    /// Number of live allocations
    pub async fn allocation_count(&self) -> usize {
        self.state.allocations.lock().await.len()
    }
}

impl Drop for TurnRelay {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve_udp(socket: Arc<UdpSocket>, state: Arc<TurnState>, shutdown: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("TURN UDP task shutting down");
                return;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "TURN UDP recv error");
                    continue;
                }
            },
        };

        if let Some(response) = handle_packet(&state, &buf[..len], from).await {
            if let Err(e) = socket.send_to(&response, from).await {
                warn!(error = %e, client = %from, "TURN UDP send error");
            }
        }
    }
}

async fn serve_tcp(listener: TcpListener, state: Arc<TurnState>, shutdown: CancellationToken) {
    loop {
        let (stream, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("TURN TCP task shutting down");
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "TURN TCP accept error");
                    continue;
                }
            },
        };

        debug!(client = %from, "TURN TCP connection");
        tokio::spawn(serve_tcp_connection(stream, from, state.clone(), shutdown.clone()));
    }
}

async fn serve_tcp_connection(
    mut stream: TcpStream,
    from: SocketAddr,
    state: Arc<TurnState>,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => return,
            read = read_framed_stun(&mut stream) => match read {
                Ok(Some(message)) => message,
                Ok(None) => {
                    debug!(client = %from, "TURN TCP connection closed");
                    return;
                }
                Err(e) => {
                    debug!(client = %from, error = %e, "TURN TCP read error");
                    return;
                }
            },
        };

        if let Some(response) = handle_packet(&state, &message, from).await {
            if let Err(e) = stream.write_all(&response).await {
                debug!(client = %from, error = %e, "TURN TCP write error");
                return;
            }
        }
    }
}

/// Read one STUN-framed message from a TCP stream
///
/// Returns `Ok(None)` on clean EOF at a frame boundary.
async fn read_framed_stun(stream: &mut TcpStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 20];
    match stream.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let body_len = u16::from_be_bytes([header[2], header[3]]) as usize;
    let mut message = header.to_vec();
    message.resize(20 + body_len, 0);
    stream.read_exact(&mut message[20..]).await?;
    Ok(Some(message))
}

/// Dispatch one client-facing packet, returning the response bytes
async fn handle_packet(state: &Arc<TurnState>, data: &[u8], from: SocketAddr) -> Option<Vec<u8>> {
    if !StunMessage::is_stun(data) {
        // Channel-data and other non-STUN traffic from a client with an
        // allocation counts as relayed traffic.
        let mut allocations = state.allocations.lock().await;
        if let Some(allocation) = allocations.get_mut(&from) {
            allocation.record_traffic(data.len());
        }
        return None;
    }

    let message = match StunMessage::decode(data) {
        Ok(message) => message,
        Err(e) => {
            debug!(client = %from, error = %e, "Discarding malformed TURN message");
            return None;
        }
    };

    match (message.class, message.method) {
        (StunClass::Request, StunMethod::Binding) => {
            let mut response = StunMessage::response_to(&message, StunClass::SuccessResponse);
            response.add_xor_mapped_address(from);
            Some(response.encode())
        }
        (StunClass::Request, StunMethod::Allocate) => handle_allocate(state, &message, from).await,
        (StunClass::Request, StunMethod::Refresh) => handle_refresh(state, &message, from).await,
        (StunClass::Indication, StunMethod::Send) => {
            handle_send_indication(state, &message, from).await;
            None
        }
        _ => {
            debug!(client = %from, class = ?message.class, method = ?message.method, "Unhandled TURN message");
            None
        }
    }
}

/// Authenticate a request, returning the 401 challenge on failure
fn authenticate(state: &TurnState, message: &StunMessage, from: SocketAddr) -> Result<String, Vec<u8>> {
    let challenge = |reason: &str| {
        debug!(client = %from, reason, "TURN request unauthenticated");
        let mut response = StunMessage::response_to(message, StunClass::ErrorResponse);
        response.add_error_code(401, "Unauthorized");
        response.add_string(ATTR_REALM, &state.realm);
        response.add_string(ATTR_NONCE, &state.nonce);
        response.encode()
    };

    if !message.has_integrity() {
        return Err(challenge("missing MESSAGE-INTEGRITY"));
    }
    let username = match message.username() {
        Some(username) => username,
        None => return Err(challenge("missing USERNAME")),
    };
    let realm = message.realm().unwrap_or_else(|| state.realm.clone());
    let key = match state.auth.compute_key(&username, &realm) {
        Some(key) => key,
        None => return Err(challenge("unknown user")),
    };
    if !message.check_integrity(&key) {
        return Err(challenge("bad MESSAGE-INTEGRITY"));
    }
    Ok(username)
}

async fn handle_allocate(
    state: &Arc<TurnState>,
    message: &StunMessage,
    from: SocketAddr,
) -> Option<Vec<u8>> {
    // Unauthenticated -> Authenticated
    let username = match authenticate(state, message, from) {
        Ok(username) => username,
        Err(challenge) => return Some(challenge),
    };

    // A retransmitted Allocate from a client with a live allocation is
    // answered with the existing relayed address; binding a fresh relay
    // socket here would advertise an address the server never keeps.
    {
        let allocations = state.allocations.lock().await;
        if let Some(existing) = allocations.get(&from) {
            if !existing.is_expired() {
                debug!(client = %from, relay = %existing.relay_addr, "Duplicate Allocate");
                let mut response =
                    StunMessage::response_to(message, StunClass::SuccessResponse);
                response.add_xor_relayed_address(existing.relay_addr);
                response.add_xor_mapped_address(from);
                response.add_lifetime(existing.lifetime.as_secs() as u32);
                return Some(response.encode());
            }
        }
    }

    // Authenticated -> Redirected: policy may terminate the attempt. A
    // target equal to our own advertised address is a no-op.
    if let Some(target) = state.redirect.should_redirect(from) {
        if target != state.advertised_addr {
            info!(client = %from, target = %target, "Redirecting allocation");
            let mut response = StunMessage::response_to(message, StunClass::ErrorResponse);
            response.add_error_code(300, "Try Alternate");
            response.add_alternate_server(target);
            return Some(response.encode());
        }
    }

    // Authenticated -> Allocated: reserve a relayed-media socket from the
    // external factory (external family, ephemeral port).
    let relay_socket = match UdpSocket::bind(SocketAddr::new(state.external_ip, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(client = %from, error = %e, "Relay socket allocation failed");
            let mut response = StunMessage::response_to(message, StunClass::ErrorResponse);
            response.add_error_code(508, "Insufficient Capacity");
            return Some(response.encode());
        }
    };
    let relay_addr = match relay_socket.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(client = %from, error = %e, "Relay socket has no local address");
            return None;
        }
    };

    let lifetime = message.lifetime().map(|s| Duration::from_secs(s as u64));
    let mut allocations = state.allocations.lock().await;
    let granted = match allocations.insert(
        from,
        Arc::new(relay_socket),
        relay_addr,
        username.clone(),
        lifetime,
    ) {
        Ok(granted) => granted,
        Err(e) => {
            warn!(client = %from, error = %e, "Allocation rejected");
            let mut response = StunMessage::response_to(message, StunClass::ErrorResponse);
            response.add_error_code(486, "Allocation Quota Reached");
            return Some(response.encode());
        }
    };

    info!(
        client = %from,
        relay = %relay_addr,
        username = %username,
        lifetime_secs = granted.as_secs(),
        "Allocation granted"
    );

    let mut response = StunMessage::response_to(message, StunClass::SuccessResponse);
    response.add_xor_relayed_address(relay_addr);
    response.add_xor_mapped_address(from);
    response.add_lifetime(granted.as_secs() as u32);
    Some(response.encode())
}

async fn handle_refresh(
    state: &Arc<TurnState>,
    message: &StunMessage,
    from: SocketAddr,
) -> Option<Vec<u8>> {
    if let Err(challenge) = authenticate(state, message, from) {
        return Some(challenge);
    }

    let requested = message.lifetime().unwrap_or(0);
    let mut allocations = state.allocations.lock().await;

    let result = if requested == 0 {
        // Lifetime zero closes the allocation.
        allocations.close(&from).map(|_| 0u32)
    } else {
        // The response must carry the lease actually granted, not the
        // requested one; the table clamps oversized requests.
        allocations
            .refresh(&from, Duration::from_secs(requested as u64))
            .map(|granted| granted.as_secs() as u32)
    };

    match result {
        Ok(granted) => {
            debug!(client = %from, lifetime_secs = granted, "Allocation refreshed");
            let mut response = StunMessage::response_to(message, StunClass::SuccessResponse);
            response.add_lifetime(granted);
            Some(response.encode())
        }
        Err(e) => {
            debug!(client = %from, error = %e, "Refresh for unknown allocation");
            let mut response = StunMessage::response_to(message, StunClass::ErrorResponse);
            response.add_error_code(437, "Allocation Mismatch");
            Some(response.encode())
        }
    }
}

/// Forward a Send indication's DATA to the peer via the relay socket
async fn handle_send_indication(state: &Arc<TurnState>, message: &StunMessage, from: SocketAddr) {
    let peer = match message.xor_address(ATTR_XOR_PEER_ADDRESS) {
        Some(peer) => peer,
        None => return,
    };
    let data: Option<Bytes> = message.attribute(ATTR_DATA).cloned();
    let data = match data {
        Some(data) => data,
        None => return,
    };

    let socket = {
        let mut allocations = state.allocations.lock().await;
        match allocations.get_mut(&from) {
            Some(allocation) if !allocation.is_expired() => {
                allocation.record_traffic(data.len());
                allocation.relay_socket.clone()
            }
            _ => {
                debug!(client = %from, "Send indication without allocation");
                return;
            }
        }
    };

    if let Err(e) = socket.send_to(&data, peer).await {
        debug!(client = %from, peer = %peer, error = %e, "Relay send failed");
    }
}

async fn cleanup_loop(state: Arc<TurnState>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {
                let removed = state.allocations.lock().await.cleanup_expired();
                if removed > 0 {
                    debug!(removed, "Expired allocations released");
                }
            }
        }
    }
}
