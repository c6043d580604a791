//! Field-level authenticated encryption for semi-structured records.
//!
//! If you have a record -- a CV, say -- whose individual fields need to be
//! encrypted, rotated, and shared independently of one another, then a
//! [`FieldVault`] is for you.  Each field is sealed with ChaCha20-Poly1305
//! under a key drawn from a [`KeyRing`], in one of two modes: `Single` (one
//! shared key protects every field, giving all-or-nothing access) or `Multi`
//! (one dedicated key per field, giving field-granular access).
//!
//! The interesting part is the key lifecycle.  Keys live in the ring in
//! creation order, can be revoked (soft-deleted, so old ciphertext stays
//! attributable even though it can no longer be decrypted), rotated (one
//! field re-encrypted under a brand-new key, every other field untouched),
//! and eventually pruned once a revoked key has outlived its retention
//! window.
//!
//! Getting data *out* to someone else works through "shareable keys": asking
//! for the key that protects a field hands back that key's id, its base64
//! bytes, and the full list of fields it unlocks -- exactly the keys needed
//! for a field subset, no more.  Handing that to a recipient is an explicit,
//! out-of-band trust decision; this crate is not a key-exchange or PKI
//! system.
//!
//! Persistence keeps the two artifacts deliberately separate: the encrypted
//! record (ciphertexts plus field → key-id bindings, useless on its own) and
//! the key manifest (the sensitive one, containing actual key material).
//! Restoring a record without importing its manifest leaves every field
//! present but undecryptable, which is the point.

mod cipher;
mod error;
mod keyring;
mod manifest;
mod value;
mod vault;

pub mod store;

mod key;
mod key_id;

pub use cipher::SealedField;
pub use error::Error;
pub use key::{Key, generate_key};
pub use key_id::KeyId;
pub use keyring::{KeyRecord, KeyRing, KeyRingStats, KeySummary};
pub use manifest::{EncryptedRecord, FieldExport, KeyManifest, RecordMetadata, ShareableKey};
pub use value::{FieldValue, ValueKind};
pub use vault::{FieldVault, KeyMode, VaultStats};
