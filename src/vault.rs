use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
	collections::{BTreeMap, BTreeSet},
	path::Path,
	sync::Arc,
};

use super::{
	EncryptedRecord, Error, FieldExport, FieldValue, Key, KeyId, KeyManifest, KeyRing,
	KeySummary, RecordMetadata, SealedField, ShareableKey, cipher, generate_key, store,
};

/// How keys are assigned to fields when a record is loaded.
///
/// `Single` is all-or-nothing: every field shares the ring's current key, so
/// sharing any field's key shares the whole record.  `Multi` gives each field
/// its own key, for field-granular sharing and rotation.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
	Single,
	Multi,
}

/// Aggregate counts over the vault and its key ring.
#[derive(Clone, Debug, Serialize)]
pub struct VaultStats {
	pub total_fields: usize,
	pub total_keys: usize,
	pub active_keys: usize,
	pub revoked_keys: usize,
	pub current_key_id: Option<KeyId>,
}

#[derive(Debug, Default)]
struct VaultState {
	keys: KeyRing,
	sealed: BTreeMap<String, SealedField>,
	field_keys: BTreeMap<String, KeyId>,
}

/// The field-encryption orchestrator: one key ring plus the per-record field
/// state, behind a single reader/writer lock.
///
/// Every operation runs to completion under one guard, so readers never
/// observe a field whose ciphertext and key binding disagree -- rotation's
/// decrypt / re-seal / swap happens entirely inside one write guard.  The
/// only I/O the vault performs (persistence) happens on a snapshot, after
/// the guard has been dropped.
///
/// A [`FieldVault`] is `Clone`; clones share the same state, so it can be
/// handed to as many threads as needed.
///
/// # Example
///
/// ```rust
/// use field_vault::{Error, FieldVault, KeyMode};
/// use std::collections::BTreeMap;
/// # fn main() -> Result<(), Error> {
///
/// let vault = FieldVault::new();
/// vault.load_fields(
///     BTreeMap::from([
///         ("email".to_string(), "alice@example.com".into()),
///         ("phone".to_string(), "+61 555 0100".into()),
///     ]),
///     KeyMode::Multi,
/// )?;
///
/// assert_eq!(
///     field_vault::FieldValue::from("alice@example.com"),
///     vault.get_field("email")?,
/// );
///
/// // Each field got its own key, so sharing "email" shares only "email"
/// let shareable = vault.shareable_key("email")?;
/// assert_eq!(vec!["email".to_string()], shareable.fields);
///
/// // Rotation re-keys one field and leaves the rest alone
/// let new_key_id = vault.rotate_field_key("email")?;
/// assert_eq!(new_key_id, vault.shareable_key("email")?.key_id);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct FieldVault {
	state: Arc<RwLock<VaultState>>,
}

impl FieldVault {
	pub fn new() -> Self {
		Self::default()
	}

	/// Encrypt and store every field of `fields`, assigning keys per `mode`.
	///
	/// In `Multi` mode each field gets a freshly created key.  In `Single`
	/// mode the ring's current key is reused (created on first need), so a
	/// record loaded in one call shares one key across all its fields.
	/// Loading a field name that already exists overwrites its ciphertext
	/// and rebinds it.
	///
	/// # Errors
	///
	/// [`Error::EmptyRecord`] when `fields` is empty.  [`Error::KeyRevoked`]
	/// in `Single` mode when the current key has been revoked -- the vault
	/// does not silently reassign `current` on revocation.
	#[tracing::instrument(level = "debug", skip(self, fields))]
	pub fn load_fields(
		&self,
		fields: BTreeMap<String, FieldValue>,
		mode: KeyMode,
	) -> Result<(), Error> {
		if fields.is_empty() {
			return Err(Error::EmptyRecord);
		}

		let mut state = self.state.write_arc();

		for (field, value) in fields {
			let key_id = match mode {
				KeyMode::Multi => state.keys.create_key(),
				KeyMode::Single => {
					let current = state.keys.current().map(|record| record.id().clone());
					match current {
						Some(id) => id,
						None => state.keys.create_key(),
					}
				}
			};
			let key = state.keys.key_bytes(&key_id)?;

			let sealed = cipher::seal(&value.to_plaintext()?, value.kind(), &key)?;

			if let Some(old_id) = state.field_keys.get(&field).cloned() {
				if old_id != key_id {
					state.keys.unbind_field(&old_id, &field);
				}
			}

			state.keys.bind_field(&key_id, &field)?;
			state.sealed.insert(field.clone(), sealed);

			tracing::debug!(field, key_id = %key_id, "Sealed field");
			state.field_keys.insert(field, key_id);
		}

		Ok(())
	}

	/// Decrypt one field and return its original value.
	///
	/// # Errors
	///
	/// [`Error::FieldNotFound`], [`Error::KeyNotFound`] /
	/// [`Error::KeyRevoked`] when the field's key is unavailable, or
	/// [`Error::Decryption`] when authentication fails.  A failed decryption
	/// never yields partial plaintext.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn get_field(&self, field: &str) -> Result<FieldValue, Error> {
		let state = self.state.read_arc();

		let sealed = state
			.sealed
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?;
		let key_id = state
			.field_keys
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?;
		let key = state.keys.key_bytes(key_id)?;

		let plaintext = cipher::open(sealed, &key)?;
		FieldValue::from_plaintext(plaintext, sealed.kind)
	}

	/// Re-key one field: decrypt it under its current key, create a brand-new
	/// key, re-seal, and swap the binding.  Returns the new key's id.
	///
	/// The new ciphertext and key record are fully staged before any shared
	/// state changes, so a failure at any step leaves the vault exactly as it
	/// was.  Other fields are untouched, even ones sharing the old key.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn rotate_field_key(&self, field: &str) -> Result<KeyId, Error> {
		let mut state = self.state.write_arc();

		let sealed = state
			.sealed
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?
			.clone();
		let old_id = state
			.field_keys
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?
			.clone();

		let old_key = state.keys.key_bytes(&old_id)?;
		let plaintext = cipher::open(&sealed, &old_key)?;

		// Stage everything before mutating, so failure leaves no trace
		let new_key = generate_key();
		let resealed = cipher::seal(&plaintext, sealed.kind, &new_key)?;
		let new_id = KeyId::generate();

		state
			.keys
			.adopt(new_id.clone(), new_key, BTreeSet::from([field.to_string()]))?;
		state.sealed.insert(field.to_string(), resealed);
		state.field_keys.insert(field.to_string(), new_id.clone());
		state.keys.unbind_field(&old_id, field);

		tracing::debug!(field, old_key_id = %old_id, new_key_id = %new_id, "Rotated field key");
		Ok(new_id)
	}

	/// Package the key protecting `field` for out-of-band transmission.
	///
	/// The result carries the *full* sorted list of fields that key unlocks,
	/// not just the one asked about -- in single-key mode that is every field
	/// in the record, which is exactly the all-or-nothing semantics of that
	/// mode.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn shareable_key(&self, field: &str) -> Result<ShareableKey, Error> {
		let state = self.state.read_arc();

		let key_id = state
			.field_keys
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?;
		let record = state
			.keys
			.record(key_id)
			.ok_or_else(|| Error::key_not_found(key_id))?;
		if record.is_revoked() {
			return Err(Error::key_revoked(key_id));
		}

		Ok(ShareableKey {
			key_id: key_id.clone(),
			key: Some(record.key().to_base64()),
			fields: record.fields().map(str::to_string).collect(),
		})
	}

	/// The full key manifest: one entry (with key bytes) per distinct live
	/// key, de-duplicated by id, plus the flattened field → key-id map.
	/// Revoked keys are skipped.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn all_keys(&self) -> KeyManifest {
		let state = self.state.read_arc();

		let mut manifest = KeyManifest::default();

		for (field, key_id) in &state.field_keys {
			manifest.field_map.insert(field.clone(), key_id.clone());

			if manifest.keys.contains_key(key_id) {
				continue;
			}

			if let Some(record) = state.keys.record(key_id) {
				if !record.is_revoked() {
					manifest.keys.insert(
						key_id.clone(),
						ShareableKey {
							key_id: key_id.clone(),
							key: Some(record.key().to_base64()),
							fields: record.fields().map(str::to_string).collect(),
						},
					);
				}
			}
		}

		manifest
	}

	/// The metadata-only manifest from the registry: ids and field lists,
	/// no key bytes.  Safe to log or display.
	pub fn key_metadata(&self) -> KeyManifest {
		self.state.read_arc().keys.export_manifest()
	}

	/// Package one field with its key for transmission: the sealed entry as
	/// a JSON string, plus the key id and base64 key bytes.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn export_field(&self, field: &str) -> Result<FieldExport, Error> {
		let state = self.state.read_arc();

		let sealed = state
			.sealed
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?;
		let key_id = state
			.field_keys
			.get(field)
			.ok_or_else(|| Error::field_not_found(field))?;
		let record = state
			.keys
			.record(key_id)
			.ok_or_else(|| Error::key_not_found(key_id))?;
		if record.is_revoked() {
			return Err(Error::key_revoked(key_id));
		}

		let encrypted_data = serde_json::to_string(sealed)
			.map_err(|e| Error::serialization("sealed field", e))?;

		Ok(FieldExport {
			field: field.to_string(),
			encrypted_data,
			key_id: key_id.clone(),
			key: record.key().to_base64(),
		})
	}

	/// Snapshot the encrypted record in its persisted shape.  Carries
	/// ciphertexts and key ids only; never key material.
	pub fn snapshot_record(&self) -> EncryptedRecord {
		let state = self.state.read_arc();

		EncryptedRecord {
			encrypted_data: state.sealed.clone(),
			field_key_map: state.field_keys.clone(),
			metadata: RecordMetadata {
				total_fields: state.sealed.len(),
				total_keys: state.keys.len(),
			},
		}
	}

	/// Write the encrypted record to `path`.  The snapshot is taken under
	/// the read guard; the file write happens after the guard is dropped.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn save_record(&self, path: &Path) -> Result<(), Error> {
		let record = self.snapshot_record();
		store::write_json(path, &record)
	}

	/// Write the key manifest (including key bytes!) to `path`.  This file
	/// is the sensitive artifact; it is persisted separately from the record
	/// on purpose.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn save_keys(&self, path: &Path) -> Result<(), Error> {
		let manifest = self.all_keys();
		store::write_json(path, &manifest)
	}

	/// Restore a persisted encrypted record: ciphertexts and field → key-id
	/// bindings.  Key material is *not* restored -- the record alone is not
	/// decryptable, and keys arrive separately via [`FieldVault::import_keys`].
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn load_record(&self, path: &Path) -> Result<(), Error> {
		let record: EncryptedRecord = store::read_json(path)?;

		let mut state = self.state.write_arc();
		state.sealed = record.encrypted_data;
		state.field_keys = record.field_key_map;

		tracing::debug!(
			total_fields = record.metadata.total_fields,
			"Loaded encrypted record"
		);
		Ok(())
	}

	/// Adopt every key in `manifest` into the ring, with its id and field
	/// bindings.  The whole manifest is validated first -- ids well-formed,
	/// key material present and exactly 32 bytes, no id already in the ring
	/// -- so a bad manifest changes nothing.
	#[tracing::instrument(level = "debug", skip(self, manifest))]
	pub fn import_keys(&self, manifest: &KeyManifest) -> Result<usize, Error> {
		let mut staged = Vec::with_capacity(manifest.keys.len());

		for (id, entry) in &manifest.keys {
			if !id.is_well_formed() {
				return Err(Error::invalid_key(format!(
					"malformed key id '{id}' (need 32 lowercase hex chars)"
				)));
			}
			if &entry.key_id != id {
				return Err(Error::invalid_key(format!(
					"manifest entry {id} disagrees with its key_id"
				)));
			}

			let encoded = entry.key.as_deref().ok_or_else(|| {
				Error::invalid_key(format!("manifest carries no key material for {id}"))
			})?;
			let key = Key::from_base64(encoded)?;

			let fields: BTreeSet<String> = entry.fields.iter().cloned().collect();
			staged.push((id.clone(), key, fields));
		}

		let mut state = self.state.write_arc();

		for (id, _, _) in &staged {
			if state.keys.record(id).is_some() {
				return Err(Error::invalid_key(format!("key id {id} already present")));
			}
		}

		let count = staged.len();
		for (id, key, fields) in staged {
			state.keys.adopt(id, key, fields)?;
		}

		tracing::debug!(count, "Imported keys from manifest");
		Ok(count)
	}

	/// Soft-delete a key.  Fields bound to it stay attributable but can no
	/// longer be decrypted.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn revoke_key(&self, id: &KeyId) -> Result<(), Error> {
		self.state.write_arc().keys.revoke(id)
	}

	/// Designate which key `Single`-mode loads will reuse.
	pub fn set_current_key(&self, id: &KeyId) -> Result<(), Error> {
		self.state.write_arc().keys.set_current(id)
	}

	/// Remove revoked keys older than `max_age` from the ring.  Returns how
	/// many were removed.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn prune_keys(&self, max_age: std::time::Duration) -> usize {
		self.state.write_arc().keys.prune(max_age)
	}

	/// Creation-order snapshot of the active keys.
	pub fn active_keys(&self) -> Vec<KeySummary> {
		self.state.read_arc().keys.active()
	}

	/// Creation-order snapshot of the revoked keys.
	pub fn revoked_keys(&self) -> Vec<KeySummary> {
		self.state.read_arc().keys.revoked()
	}

	/// Human-readable listing of the key ring, for display layers.
	pub fn describe_keys(&self) -> String {
		self.state.read_arc().keys.describe()
	}

	pub fn stats(&self) -> VaultStats {
		let state = self.state.read_arc();
		let keys = state.keys.stats();

		VaultStats {
			total_fields: state.sealed.len(),
			total_keys: keys.total_keys,
			active_keys: keys.active_keys,
			revoked_keys: keys.revoked_keys,
			current_key_id: keys.current_key_id,
		}
	}
}
