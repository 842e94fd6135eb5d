//! ICE server list construction
//!
//! Builds the ordered `stun:`/`turn:` URI list handed to the signaling
//! engine. Ordering is significant: some clients try entries in sequence,
//! so STUN entries always come before TURN entries.
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


use serde::Serialize;
use std::fmt;

/// Sentinel endpoint value disabling the STUN entry
pub const STUN_DISABLED: &str = "-";

/// URI scheme of an ICE server entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IceScheme {
    Stun,
    Turn,
}

impl IceScheme {
    fn prefix(self) -> &'static str {
        match self {
            IceScheme::Stun => "stun:",
            IceScheme::Turn => "turn:",
        }
    }
}

/// One entry of the ICE server list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IceServerEntry {
    pub scheme: IceScheme,
    pub uri: String,
}

impl fmt::Display for IceServerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Immutable, ordered ICE server list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IceServerList {
    entries: Vec<IceServerEntry>,
}

impl IceServerList {
    /// Build the list from optional STUN and TURN endpoint strings
    ///
    /// The STUN endpoint is skipped when empty or equal to the disable
    /// sentinel `"-"`; the TURN endpoint is skipped when empty.
    pub fn build(stun_endpoint: &str, turn_endpoint: &str) -> Self {
        let mut entries = Vec::new();

        if !stun_endpoint.is_empty() && stun_endpoint != STUN_DISABLED {
            entries.push(IceServerEntry {
                scheme: IceScheme::Stun,
                uri: format!("{}{}", IceScheme::Stun.prefix(), stun_endpoint),
            });
        }
        if !turn_endpoint.is_empty() {
            entries.push(IceServerEntry {
                scheme: IceScheme::Turn,
                uri: format!("{}{}", IceScheme::Turn.prefix(), turn_endpoint),
            });
        }

        IceServerList { entries }
    }

    pub fn entries(&self) -> &[IceServerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// URIs in list order
    pub fn uris(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.uri.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_endpoints_ordered() {
        let list = IceServerList::build("stun.example.com:19302", "turn:u@h:3478");
        assert_eq!(
            list.uris(),
            vec![
                "stun:stun.example.com:19302".to_string(),
                "turn:turn:u@h:3478".to_string(),
            ]
        );
        assert_eq!(list.entries()[0].scheme, IceScheme::Stun);
        assert_eq!(list.entries()[1].scheme, IceScheme::Turn);
    }

    #[test]
    fn test_stun_sentinel_disables_entry() {
        let list = IceServerList::build(STUN_DISABLED, "");
        assert!(list.is_empty());
    }

    #[test]
    fn test_empty_endpoints() {
        let list = IceServerList::build("", "");
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_turn_only() {
        let list = IceServerList::build("-", "turn@0.0.0.0:3478");
        assert_eq!(list.uris(), vec!["turn:turn@0.0.0.0:3478".to_string()]);
    }
}
