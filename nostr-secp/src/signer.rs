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

//! Signing capability keyed by a secret key.
//!
//! The remote signer dispatches every request to a [`Signer`]. The only
//! implementation shipped here is [`LocalSigner`], which holds the secret key
//! in process.

use nostr::nips::{nip04, nip44};
use nostr::{Keys, PublicKey, SecretKey};

use crate::event::{EventTemplate, SignedEvent};
use crate::CryptoError;

/// Operations the signer performs on behalf of a single identity.
pub trait Signer {
    fn public_key(&self) -> PublicKey;

    /// Finalize `template` into a signed event under this identity.
    fn sign_event(&self, template: &EventTemplate) -> Result<SignedEvent, CryptoError>;

    fn nip04_encrypt(&self, counterparty: &PublicKey, plaintext: &str)
        -> Result<String, CryptoError>;

    fn nip04_decrypt(&self, counterparty: &PublicKey, ciphertext: &str)
        -> Result<String, CryptoError>;

    fn nip44_encrypt(&self, counterparty: &PublicKey, plaintext: &str)
        -> Result<String, CryptoError>;

    fn nip44_decrypt(&self, counterparty: &PublicKey, ciphertext: &str)
        -> Result<String, CryptoError>;
}

/// In-process signer over a secret key.
pub struct LocalSigner {
    secret_key: SecretKey,
    keys: Keys,
}

impl LocalSigner {
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            keys: Keys::new(secret_key.clone()),
            secret_key,
        }
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("public_key", &self.keys.public_key().to_hex())
            .finish_non_exhaustive()
    }
}

impl Signer for LocalSigner {
    fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    fn sign_event(&self, template: &EventTemplate) -> Result<SignedEvent, CryptoError> {
        template.finalize(&self.keys)
    }

    fn nip04_encrypt(
        &self,
        counterparty: &PublicKey,
        plaintext: &str,
    ) -> Result<String, CryptoError> {
        nip04::encrypt(&self.secret_key, counterparty, plaintext)
            .map_err(|e| CryptoError::Encrypt(e.to_string()))
    }

    fn nip04_decrypt(
        &self,
        counterparty: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, CryptoError> {
        nip04::decrypt(&self.secret_key, counterparty, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }

    fn nip44_encrypt(
        &self,
        counterparty: &PublicKey,
        plaintext: &str,
    ) -> Result<String, CryptoError> {
        nip44::encrypt(
            &self.secret_key,
            counterparty,
            plaintext,
            nip44::Version::V2,
        )
        .map_err(|e| CryptoError::Encrypt(e.to_string()))
    }

    fn nip44_decrypt(
        &self,
        counterparty: &PublicKey,
        ciphertext: &str,
    ) -> Result<String, CryptoError> {
        nip44::decrypt(&self.secret_key, counterparty, ciphertext)
            .map_err(|e| CryptoError::Decrypt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_secret_key;

    fn pair() -> (LocalSigner, LocalSigner) {
        (
            LocalSigner::new(generate_secret_key()),
            LocalSigner::new(generate_secret_key()),
        )
    }

    #[test]
    fn test_nip04_between_two_parties() {
        let (alice, bob) = pair();
        let ciphertext = alice
            .nip04_encrypt(&bob.public_key(), "meet at the relay")
            .unwrap();

        assert_ne!(ciphertext, "meet at the relay");
        assert_eq!(
            bob.nip04_decrypt(&alice.public_key(), &ciphertext).unwrap(),
            "meet at the relay"
        );
        // The sender can also read back what it wrote.
        assert_eq!(
            alice.nip04_decrypt(&bob.public_key(), &ciphertext).unwrap(),
            "meet at the relay"
        );
    }

    #[test]
    fn test_nip44_between_two_parties() {
        let (alice, bob) = pair();
        let ciphertext = alice
            .nip44_encrypt(&bob.public_key(), "versioned payload ✓")
            .unwrap();

        assert_eq!(
            bob.nip44_decrypt(&alice.public_key(), &ciphertext).unwrap(),
            "versioned payload ✓"
        );
        assert_eq!(
            alice.nip44_decrypt(&bob.public_key(), &ciphertext).unwrap(),
            "versioned payload ✓"
        );
    }

    #[test]
    fn test_nip44_wrong_counterparty_fails() {
        let (alice, bob) = pair();
        let (mallory, _) = pair();
        let ciphertext = alice.nip44_encrypt(&bob.public_key(), "secret").unwrap();

        assert!(matches!(
            bob.nip44_decrypt(&mallory.public_key(), &ciphertext),
            Err(CryptoError::Decrypt(_))
        ));
    }

    #[test]
    fn test_garbage_ciphertext_rejected() {
        let (alice, bob) = pair();
        assert!(alice.nip04_decrypt(&bob.public_key(), "garbage").is_err());
        assert!(alice.nip44_decrypt(&bob.public_key(), "garbage").is_err());
    }

    #[test]
    fn test_sign_event_uses_identity_key() {
        let (alice, _) = pair();
        let template = EventTemplate {
            created_at: 1_700_000_000,
            kind: 1,
            tags: Vec::new(),
            content: "gm".to_string(),
        };

        let signed = alice.sign_event(&template).unwrap();
        assert_eq!(signed.pubkey, alice.public_key().to_hex());
        assert!(signed.verify().is_ok());
    }

    #[test]
    fn test_debug_omits_secret() {
        let secret = generate_secret_key();
        let nsec = crate::keys::encode_nsec(&secret).unwrap();
        let signer = LocalSigner::new(secret);

        let rendered = format!("{:?}", signer);
        assert!(rendered.contains(&signer.public_key().to_hex()));
        assert!(!rendered.contains(&nsec));
    }
}
