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

//! Key generation and NIP-19 (bech32) encoding.

use nostr::nips::nip19::{FromBech32, ToBech32};
use nostr::{Keys, PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::CryptoError;

/// Generate a fresh secret key from the OS random source.
pub fn generate_secret_key() -> SecretKey {
    loop {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        // Rejects zero and values above the curve order.
        if let Ok(secret_key) = SecretKey::from_slice(&bytes) {
            return secret_key;
        }
    }
}

/// Derive the x-only public key for `secret_key`.
pub fn derive_public_key(secret_key: &SecretKey) -> PublicKey {
    Keys::new(secret_key.clone()).public_key()
}

pub fn encode_nsec(secret_key: &SecretKey) -> Result<String, CryptoError> {
    secret_key
        .to_bech32()
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

pub fn encode_npub(public_key: &PublicKey) -> Result<String, CryptoError> {
    public_key
        .to_bech32()
        .map_err(|e| CryptoError::Encoding(e.to_string()))
}

pub fn decode_nsec(nsec: &str) -> Result<SecretKey, CryptoError> {
    SecretKey::from_bech32(nsec).map_err(|e| CryptoError::InvalidSecretKey(e.to_string()))
}

pub fn decode_npub(npub: &str) -> Result<PublicKey, CryptoError> {
    PublicKey::from_bech32(npub).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Parse a counterparty public key given as 64 hex characters.
pub fn parse_public_key(hex_key: &str) -> Result<PublicKey, CryptoError> {
    PublicKey::from_hex(hex_key).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}
