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

//! secp256k1 primitives for the Nostr remote signer.
//!
//! Everything that touches secret key material lives here: key generation,
//! NIP-19 encoding, event finalization and NIP-04 / NIP-44 payload
//! encryption. The signer daemon only ever sees these operations through the
//! [`Signer`] trait.

pub mod event;
pub mod keys;
pub mod signer;

pub use event::{EventTemplate, SignedEvent};
pub use keys::{
    decode_npub, decode_nsec, derive_public_key, encode_npub, encode_nsec, generate_secret_key,
    parse_public_key,
};
pub use nostr::{PublicKey, SecretKey};
pub use signer::{LocalSigner, Signer};

use thiserror::Error;

/// Errors from key handling and the underlying crypto routines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid secret key: {0}")]
    InvalidSecretKey(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Bech32 encoding failed: {0}")]
    Encoding(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),
}
