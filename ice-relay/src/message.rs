//! STUN wire codec
//!
//! Minimal RFC 5389/5766 message support: enough to answer Binding
//! requests and to authenticate, redirect, or grant Allocate requests.
//! Attribute values are kept opaque except for the handful the relay
//! interprets.
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


use crate::credentials::{message_integrity, verify_integrity, CredentialKey};
use crate::error::{RelayError, RelayResult};
use bytes::Bytes;
use rand::RngCore;
use std::net::SocketAddr;

/// STUN magic cookie (RFC 5389 section 6)
pub const MAGIC_COOKIE: u32 = 0x2112A442;
/// Fixed STUN header length
pub const HEADER_LEN: usize = 20;

// Attribute types the relay interprets.
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
pub const ATTR_USERNAME: u16 = 0x0006;
pub const ATTR_MESSAGE_INTEGRITY: u16 = 0x0008;
pub const ATTR_ERROR_CODE: u16 = 0x0009;
pub const ATTR_LIFETIME: u16 = 0x000D;
pub const ATTR_XOR_PEER_ADDRESS: u16 = 0x0012;
pub const ATTR_DATA: u16 = 0x0013;
pub const ATTR_REALM: u16 = 0x0014;
pub const ATTR_NONCE: u16 = 0x0015;
pub const ATTR_XOR_RELAYED_ADDRESS: u16 = 0x0016;
pub const ATTR_REQUESTED_TRANSPORT: u16 = 0x0019;
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;
pub const ATTR_ALTERNATE_SERVER: u16 = 0x8023;

/// STUN message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunClass {
    Request,
    Indication,
    SuccessResponse,
    ErrorResponse,
}

impl StunClass {
    fn bits(self) -> u16 {
        match self {
            StunClass::Request => 0b00,
            StunClass::Indication => 0b01,
            StunClass::SuccessResponse => 0b10,
            StunClass::ErrorResponse => 0b11,
        }
    }

    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => StunClass::Request,
            0b01 => StunClass::Indication,
            0b10 => StunClass::SuccessResponse,
            _ => StunClass::ErrorResponse,
        }
    }
}

/// STUN/TURN method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StunMethod {
    Binding,
    Allocate,
    Refresh,
    Send,
    Other(u16),
}

impl StunMethod {
    fn number(self) -> u16 {
        match self {
            StunMethod::Binding => 0x001,
            StunMethod::Allocate => 0x003,
            StunMethod::Refresh => 0x004,
            StunMethod::Send => 0x006,
            StunMethod::Other(n) => n,
        }
    }

    fn from_number(n: u16) -> Self {
        match n {
            0x001 => StunMethod::Binding,
            0x003 => StunMethod::Allocate,
            0x004 => StunMethod::Refresh,
            0x006 => StunMethod::Send,
            other => StunMethod::Other(other),
        }
    }
}

/// One STUN attribute, value opaque
#[derive(Debug, Clone)]
pub struct StunAttribute {
    pub attribute_type: u16,
    pub value: Bytes,
}

/// Integrity material captured while decoding
///
/// `input` is the message prefix the HMAC covers, with the header length
/// field already patched to end at the MESSAGE-INTEGRITY attribute.
#[derive(Debug, Clone)]
struct ReceivedIntegrity {
    input: Vec<u8>,
    received: [u8; 20],
}

/// A STUN message
#[derive(Debug, Clone)]
pub struct StunMessage {
    pub class: StunClass,
    pub method: StunMethod,
    pub transaction_id: [u8; 12],
    pub attributes: Vec<StunAttribute>,
    integrity: Option<ReceivedIntegrity>,
}

impl StunMessage {
    /// Create a message with a fresh random transaction ID
    pub fn new(class: StunClass, method: StunMethod) -> Self {
        let mut transaction_id = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut transaction_id);
        StunMessage {
            class,
            method,
            transaction_id,
            attributes: Vec::new(),
            integrity: None,
        }
    }

    /// Create a response to `request`, reusing its transaction ID
    pub fn response_to(request: &StunMessage, class: StunClass) -> Self {
        StunMessage {
            class,
            method: request.method,
            transaction_id: request.transaction_id,
            attributes: Vec::new(),
            integrity: None,
        }
    }

    /// Quick check whether a datagram looks like STUN
    pub fn is_stun(data: &[u8]) -> bool {
        if data.len() < HEADER_LEN {
            return false;
        }
        u32::from_be_bytes([data[4], data[5], data[6], data[7]]) == MAGIC_COOKIE
    }

    /// Decode a message from the wire
    pub fn decode(data: &[u8]) -> RelayResult<StunMessage> {
        if data.len() < HEADER_LEN {
            return Err(RelayError::MalformedMessage("short header".to_string()));
        }

        let message_type = u16::from_be_bytes([data[0], data[1]]);
        if message_type & 0xC000 != 0 {
            return Err(RelayError::MalformedMessage("top bits set".to_string()));
        }
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if u32::from_be_bytes([data[4], data[5], data[6], data[7]]) != MAGIC_COOKIE {
            return Err(RelayError::MalformedMessage("bad magic cookie".to_string()));
        }
        if data.len() < HEADER_LEN + length {
            return Err(RelayError::MalformedMessage("truncated body".to_string()));
        }

        let class = StunClass::from_bits(((message_type >> 7) & 0b10) | ((message_type >> 4) & 0b01));
        let method = StunMethod::from_number(
            (message_type & 0x000F)
                | ((message_type & 0x00E0) >> 1)
                | ((message_type & 0x3E00) >> 2),
        );

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&data[8..HEADER_LEN]);

        let mut attributes = Vec::new();
        let mut integrity = None;
        let mut offset = HEADER_LEN;
        let end = HEADER_LEN + length;
        while offset + 4 <= end {
            let attribute_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let value_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            let value_end = offset + 4 + value_len;
            if value_end > end {
                return Err(RelayError::MalformedMessage("truncated attribute".to_string()));
            }

            if attribute_type == ATTR_MESSAGE_INTEGRITY && integrity.is_none() {
                if value_len != 20 {
                    return Err(RelayError::MalformedMessage(
                        "bad MESSAGE-INTEGRITY length".to_string(),
                    ));
                }
                // HMAC covers the message up to this attribute, with the
                // length field patched as if the message ended right
                // after it.
                let mut input = data[..offset].to_vec();
                let patched = (offset - HEADER_LEN + 24) as u16;
                input[2..4].copy_from_slice(&patched.to_be_bytes());
                let mut received = [0u8; 20];
                received.copy_from_slice(&data[offset + 4..value_end]);
                integrity = Some(ReceivedIntegrity { input, received });
            }

            attributes.push(StunAttribute {
                attribute_type,
                value: Bytes::copy_from_slice(&data[offset + 4..value_end]),
            });
            // Attributes are padded to 4-byte boundaries.
            offset = value_end + ((4 - value_len % 4) % 4);
        }

        Ok(StunMessage {
            class,
            method,
            transaction_id,
            attributes,
            integrity,
        })
    }

    /// Encode to the wire without MESSAGE-INTEGRITY
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.encode_prefix();
        let body_len = (out.len() - HEADER_LEN) as u16;
        out[2..4].copy_from_slice(&body_len.to_be_bytes());
        out
    }

    /// Encode to the wire, appending MESSAGE-INTEGRITY keyed with `key`
    pub fn encode_with_integrity(&self, key: &CredentialKey) -> Vec<u8> {
        let mut out = self.encode_prefix();
        // Length must already count the 24-byte integrity attribute when
        // the HMAC input is formed.
        let body_len = (out.len() - HEADER_LEN + 24) as u16;
        out[2..4].copy_from_slice(&body_len.to_be_bytes());

        let mac = message_integrity(key, &out);
        out.extend_from_slice(&ATTR_MESSAGE_INTEGRITY.to_be_bytes());
        out.extend_from_slice(&20u16.to_be_bytes());
        out.extend_from_slice(&mac);
        out
    }

    fn encode_prefix(&self) -> Vec<u8> {
        let method = self.method.number();
        let class = self.class.bits();
        let message_type = (method & 0x000F)
            | ((method & 0x0070) << 1)
            | ((method & 0x0F80) << 2)
            | ((class & 0b01) << 4)
            | ((class & 0b10) << 7);

        let mut out = Vec::with_capacity(HEADER_LEN + 32);
        out.extend_from_slice(&message_type.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        out.extend_from_slice(&self.transaction_id);

        for attribute in &self.attributes {
            out.extend_from_slice(&attribute.attribute_type.to_be_bytes());
            out.extend_from_slice(&(attribute.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&attribute.value);
            let padding = (4 - attribute.value.len() % 4) % 4;
            out.extend_from_slice(&[0u8; 3][..padding]);
        }
        out
    }

    /// Verify a received MESSAGE-INTEGRITY against `key`
    ///
    /// False when the message carried no integrity attribute.
    pub fn check_integrity(&self, key: &CredentialKey) -> bool {
        match &self.integrity {
            Some(integrity) => verify_integrity(key, &integrity.input, &integrity.received),
            None => false,
        }
    }

    pub fn has_integrity(&self) -> bool {
        self.integrity.is_some()
    }

    /// First attribute of the given type
    pub fn attribute(&self, attribute_type: u16) -> Option<&Bytes> {
        self.attributes
            .iter()
            .find(|a| a.attribute_type == attribute_type)
            .map(|a| &a.value)
    }

    fn string_attribute(&self, attribute_type: u16) -> Option<String> {
        self.attribute(attribute_type)
            .and_then(|v| std::str::from_utf8(v).ok())
            .map(|s| s.to_string())
    }

    pub fn username(&self) -> Option<String> {
        self.string_attribute(ATTR_USERNAME)
    }

    pub fn realm(&self) -> Option<String> {
        self.string_attribute(ATTR_REALM)
    }

    pub fn lifetime(&self) -> Option<u32> {
        self.attribute(ATTR_LIFETIME).and_then(|v| {
            v.as_ref()
                .try_into()
                .ok()
                .map(u32::from_be_bytes)
        })
    }

    pub fn add_attribute(&mut self, attribute_type: u16, value: impl Into<Bytes>) {
        self.attributes.push(StunAttribute {
            attribute_type,
            value: value.into(),
        });
    }

    pub fn add_string(&mut self, attribute_type: u16, value: &str) {
        self.add_attribute(attribute_type, Bytes::copy_from_slice(value.as_bytes()));
    }

    pub fn add_lifetime(&mut self, seconds: u32) {
        self.add_attribute(ATTR_LIFETIME, Bytes::copy_from_slice(&seconds.to_be_bytes()));
    }

    /// XOR-MAPPED-ADDRESS of the sender as seen by the relay
    pub fn add_xor_mapped_address(&mut self, addr: SocketAddr) {
        let encoded = encode_xor_address(addr, &self.transaction_id);
        self.add_attribute(ATTR_XOR_MAPPED_ADDRESS, Bytes::from(encoded));
    }

    /// XOR-RELAYED-ADDRESS of a granted allocation
    pub fn add_xor_relayed_address(&mut self, addr: SocketAddr) {
        let encoded = encode_xor_address(addr, &self.transaction_id);
        self.add_attribute(ATTR_XOR_RELAYED_ADDRESS, Bytes::from(encoded));
    }

    /// ALTERNATE-SERVER, plain address encoding
    pub fn add_alternate_server(&mut self, addr: SocketAddr) {
        self.add_attribute(ATTR_ALTERNATE_SERVER, Bytes::from(encode_address(addr)));
    }

    pub fn add_error_code(&mut self, code: u16, reason: &str) {
        let mut value = vec![0u8, 0, (code / 100) as u8, (code % 100) as u8];
        value.extend_from_slice(reason.as_bytes());
        self.add_attribute(ATTR_ERROR_CODE, Bytes::from(value));
    }

    pub fn error_code(&self) -> Option<u16> {
        self.attribute(ATTR_ERROR_CODE).and_then(|v| {
            if v.len() < 4 {
                return None;
            }
            Some((v[2] & 0x07) as u16 * 100 + v[3] as u16)
        })
    }

    /// Decode an XOR-mapped address attribute of this message
    pub fn xor_address(&self, attribute_type: u16) -> Option<SocketAddr> {
        self.attribute(attribute_type)
            .and_then(|v| decode_xor_address(v, &self.transaction_id))
    }
}

/// Plain MAPPED-ADDRESS encoding: reserved, family, port, address
fn encode_address(addr: SocketAddr) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.push(0);
    match addr {
        SocketAddr::V4(v4) => {
            bytes.push(0x01);
            bytes.extend_from_slice(&addr.port().to_be_bytes());
            bytes.extend_from_slice(&v4.ip().octets());
        }
        SocketAddr::V6(v6) => {
            bytes.push(0x02);
            bytes.extend_from_slice(&addr.port().to_be_bytes());
            bytes.extend_from_slice(&v6.ip().octets());
        }
    }
    bytes
}

/// XOR address encoding per RFC 5389 section 15.2
fn encode_xor_address(addr: SocketAddr, transaction_id: &[u8; 12]) -> Vec<u8> {
    let mut bytes = encode_address(addr);
    let cookie = MAGIC_COOKIE.to_be_bytes();

    let masked_port = addr.port() ^ (MAGIC_COOKIE >> 16) as u16;
    bytes[2..4].copy_from_slice(&masked_port.to_be_bytes());

    match addr {
        SocketAddr::V4(_) => {
            for i in 0..4 {
                bytes[4 + i] ^= cookie[i];
            }
        }
        SocketAddr::V6(_) => {
            for i in 0..4 {
                bytes[4 + i] ^= cookie[i];
            }
            for i in 0..12 {
                bytes[8 + i] ^= transaction_id[i];
            }
        }
    }
    bytes
}

fn decode_xor_address(value: &[u8], transaction_id: &[u8; 12]) -> Option<SocketAddr> {
    if value.len() < 8 {
        return None;
    }
    let cookie = MAGIC_COOKIE.to_be_bytes();
    let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;

    match value[1] {
        0x01 => {
            let mut octets = [0u8; 4];
            for i in 0..4 {
                octets[i] = value[4 + i] ^ cookie[i];
            }
            Some(SocketAddr::from((octets, port)))
        }
        0x02 if value.len() >= 20 => {
            let mut octets = [0u8; 16];
            for i in 0..4 {
                octets[i] = value[4 + i] ^ cookie[i];
            }
            for i in 0..12 {
                octets[4 + i] = value[8 + i] ^ transaction_id[i];
            }
            Some(SocketAddr::from((octets, port)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::long_term_credential_key;

    #[test]
    fn test_binding_request_round_trip() {
        let request = StunMessage::new(StunClass::Request, StunMethod::Binding);
        let wire = request.encode();

        assert!(StunMessage::is_stun(&wire));
        let decoded = StunMessage::decode(&wire).unwrap();
        assert_eq!(decoded.class, StunClass::Request);
        assert_eq!(decoded.method, StunMethod::Binding);
        assert_eq!(decoded.transaction_id, request.transaction_id);
    }

    #[test]
    fn test_xor_mapped_address_round_trip() {
        let mut response = StunMessage::new(StunClass::SuccessResponse, StunMethod::Binding);
        let addr: SocketAddr = "203.0.113.7:49152".parse().unwrap();
        response.add_xor_mapped_address(addr);

        let decoded = StunMessage::decode(&response.encode()).unwrap();
        assert_eq!(decoded.xor_address(ATTR_XOR_MAPPED_ADDRESS), Some(addr));
    }

    #[test]
    fn test_xor_address_v6_round_trip() {
        let mut response = StunMessage::new(StunClass::SuccessResponse, StunMethod::Allocate);
        let addr: SocketAddr = "[2001:db8::1]:3478".parse().unwrap();
        response.add_xor_relayed_address(addr);

        let decoded = StunMessage::decode(&response.encode()).unwrap();
        assert_eq!(decoded.xor_address(ATTR_XOR_RELAYED_ADDRESS), Some(addr));
    }

    #[test]
    fn test_integrity_round_trip() {
        let key = long_term_credential_key("turn", "gateway", "turn");

        let mut request = StunMessage::new(StunClass::Request, StunMethod::Allocate);
        request.add_string(ATTR_USERNAME, "turn");
        request.add_string(ATTR_REALM, "gateway");
        let wire = request.encode_with_integrity(&key);

        let decoded = StunMessage::decode(&wire).unwrap();
        assert!(decoded.has_integrity());
        assert!(decoded.check_integrity(&key));

        let wrong_key = long_term_credential_key("other", "gateway", "other");
        assert!(!decoded.check_integrity(&wrong_key));
    }

    #[test]
    fn test_tampered_message_fails_integrity() {
        let key = long_term_credential_key("turn", "gateway", "turn");
        let mut request = StunMessage::new(StunClass::Request, StunMethod::Allocate);
        request.add_string(ATTR_USERNAME, "turn");
        let mut wire = request.encode_with_integrity(&key);

        // Flip a byte inside the USERNAME value.
        wire[HEADER_LEN + 4] ^= 0xFF;
        let decoded = StunMessage::decode(&wire).unwrap();
        assert!(!decoded.check_integrity(&key));
    }

    #[test]
    fn test_error_code_round_trip() {
        let mut response = StunMessage::new(StunClass::ErrorResponse, StunMethod::Allocate);
        response.add_error_code(401, "Unauthorized");
        response.add_string(ATTR_REALM, "gateway");

        let decoded = StunMessage::decode(&response.encode()).unwrap();
        assert_eq!(decoded.error_code(), Some(401));
        assert_eq!(decoded.realm().as_deref(), Some("gateway"));
    }

    #[test]
    fn test_reject_non_stun() {
        assert!(StunMessage::decode(b"GET / HTTP/1.1\r\n\r\n").is_err());
        assert!(StunMessage::decode(&[0u8; 8]).is_err());
        assert!(!StunMessage::is_stun(&[0u8; 8]));
    }
}
