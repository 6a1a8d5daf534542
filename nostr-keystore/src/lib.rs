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

//! Identity storage for the Nostr remote signer.
//!
//! A single [`IdentityRecord`] per store: the secret key, its public key and
//! the origins allowed to use it. The signer reloads it on every request, so
//! grants and re-provisioning take effect without a restart.
//!
//! ## Usage
//!
//! ```ignore
//! use nostr_keystore::{provision, grant_origin, BlobIdentityStore, FileBlobStore};
//!
//! let store = BlobIdentityStore::new(FileBlobStore::new("/var/lib/nostr-signer"));
//! let creds = provision(&store)?;
//! grant_origin(&store, "https://app.example")?;
//! ```

pub mod identity;
pub mod store;

pub use identity::{
    grant_origin, provision, revoke_origin, BlobIdentityStore, Credentials, IdentityError,
    IdentityRecord, IdentityStore, IDENTITY_KEY,
};
pub use store::{BlobStore, FileBlobStore, MemoryBlobStore, StoreError};
