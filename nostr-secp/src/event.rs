// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Event shapes exchanged with the signer.
//!
//! These mirror the NIP-01 JSON layout so they can cross the message channel
//! untouched; conversion to and from [`nostr::Event`] goes through that same
//! JSON form.

use nostr::{Event, EventBuilder, Keys, Kind, Tag, Timestamp};
use serde::{Deserialize, Serialize};

use crate::CryptoError;

/// Unsigned event fields supplied by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    /// Unix seconds
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

/// A finalized event: the template plus computed `id`, `pubkey` and `sig`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    /// Hex SHA-256 of the canonical serialization
    pub id: String,
    /// Hex x-only public key of the signer
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// Hex BIP-340 Schnorr signature over `id`
    pub sig: String,
}

impl EventTemplate {
    /// Compute the id and sign with `keys`.
    pub(crate) fn finalize(&self, keys: &Keys) -> Result<SignedEvent, CryptoError> {
        let tags = self
            .tags
            .iter()
            .map(|tag| {
                Tag::parse(tag.as_slice()).map_err(|e| CryptoError::InvalidTag(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let event = EventBuilder::new(Kind::from(self.kind), self.content.clone(), tags)
            .custom_created_at(Timestamp::from(self.created_at))
            .to_event(keys)
            .map_err(|e| CryptoError::Sign(e.to_string()))?;

        SignedEvent::from_nostr(&event)
    }
}

impl SignedEvent {
    fn from_nostr(event: &Event) -> Result<Self, CryptoError> {
        let value =
            serde_json::to_value(event).map_err(|e| CryptoError::InvalidEvent(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| CryptoError::InvalidEvent(e.to_string()))
    }

    fn to_nostr(&self) -> Result<Event, CryptoError> {
        let value =
            serde_json::to_value(self).map_err(|e| CryptoError::InvalidEvent(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| CryptoError::InvalidEvent(e.to_string()))
    }

    /// Check that `id` matches the content and `sig` verifies under `pubkey`.
    pub fn verify(&self) -> Result<(), CryptoError> {
        self.to_nostr()?
            .verify()
            .map_err(|e| CryptoError::InvalidEvent(e.to_string()))
    }

    /// The fields the client originally asked to have signed.
    pub fn template(&self) -> EventTemplate {
        EventTemplate {
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        }
    }
}
