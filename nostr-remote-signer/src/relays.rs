//! Relay configuration returned by `getRelays`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Relays every identity advertises.
pub const DEFAULT_RELAYS: &[&str] = &[
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
    "wss://nos.lol",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPolicy {
    pub read: bool,
    pub write: bool,
}

/// Relay URL to read/write policy.
pub type RelayMap = BTreeMap<String, RelayPolicy>;

pub fn default_relays() -> RelayMap {
    DEFAULT_RELAYS
        .iter()
        .map(|url| {
            (
                url.to_string(),
                RelayPolicy {
                    read: true,
                    write: true,
                },
            )
        })
        .collect()
}
