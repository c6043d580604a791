//! The key registry: an ordered, indexed collection of key records.
//!
//! Records live in an arena (a slot vector with a free list) and are chained
//! into a doubly linked list by slot index, oldest first.  Insertion is
//! always at the tail and removal only ever happens during [`KeyRing::prune`],
//! so both are O(1) pointer fixups; the side index keeps by-id lookup O(1)
//! regardless of where a record sits in the chain.
//!
//! The ring itself is not synchronized -- [`FieldVault`](crate::FieldVault)
//! owns one behind its lock, and that lock is the only mutation surface.

use chrono::Utc;
use serde::Serialize;
use std::{
	collections::{BTreeSet, HashMap},
	time::Duration,
};

use super::{Error, Key, KeyId, KeyManifest, ShareableKey, generate_key};

/// Metadata and key material for one encryption key, plus the set of fields
/// it currently protects.
#[derive(Debug)]
pub struct KeyRecord {
	id: KeyId,
	key: Key,
	// Creation time, refreshed on revocation so pruning measures the
	// retention window from when the key stopped being usable
	timestamp: i64,
	revoked: bool,
	fields: BTreeSet<String>,
	prev: Option<usize>,
	next: Option<usize>,
}

impl KeyRecord {
	pub fn id(&self) -> &KeyId {
		&self.id
	}

	pub fn timestamp(&self) -> i64 {
		self.timestamp
	}

	pub fn is_revoked(&self) -> bool {
		self.revoked
	}

	pub fn fields(&self) -> impl Iterator<Item = &str> {
		self.fields.iter().map(String::as_str)
	}

	/// Seconds elapsed since this record's timestamp.
	pub fn age(&self) -> Duration {
		Duration::from_secs((Utc::now().timestamp() - self.timestamp).max(0) as u64)
	}

	pub fn is_older_than(&self, max_age: Duration) -> bool {
		self.age() > max_age
	}

	pub(crate) fn key(&self) -> &Key {
		&self.key
	}
}

/// A creation-order snapshot of one record, for listings and audit.  Holds
/// no key material.
#[derive(Clone, Debug, Serialize)]
pub struct KeySummary {
	pub key_id: KeyId,
	pub timestamp: i64,
	pub revoked: bool,
	pub current: bool,
	pub fields: Vec<String>,
}

/// Aggregate counts over the ring.
#[derive(Clone, Debug, Serialize)]
pub struct KeyRingStats {
	pub total_keys: usize,
	pub active_keys: usize,
	pub revoked_keys: usize,
	pub current_key_id: Option<KeyId>,
}

#[derive(Debug, Default)]
pub struct KeyRing {
	slots: Vec<Option<KeyRecord>>,
	free: Vec<usize>,
	index: HashMap<KeyId, usize>,
	head: Option<usize>,
	tail: Option<usize>,
	current: Option<usize>,
	len: usize,
}

impl KeyRing {
	pub fn new() -> Self {
		Self::default()
	}

	/// Generate a fresh key record, append it to the tail, and make it
	/// current.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn create_key(&mut self) -> KeyId {
		let id = KeyId::generate();

		// A freshly generated 128-bit id colliding with a live one would
		// mean the process entropy source is broken; treat it as such
		self.adopt(id.clone(), generate_key(), BTreeSet::new())
			.expect("generated key id collided");

		id
	}

	/// Append a record with caller-supplied id, key material, and field
	/// bindings (manifest import).  The adopted key becomes current, same as
	/// a created one.
	pub(crate) fn adopt(
		&mut self,
		id: KeyId,
		key: Key,
		fields: BTreeSet<String>,
	) -> Result<(), Error> {
		if self.index.contains_key(&id) {
			return Err(Error::invalid_key(format!("duplicate key id {id}")));
		}

		let record = KeyRecord {
			id: id.clone(),
			key,
			timestamp: Utc::now().timestamp(),
			revoked: false,
			fields,
			prev: self.tail,
			next: None,
		};

		let slot = match self.free.pop() {
			Some(slot) => {
				self.slots[slot] = Some(record);
				slot
			}
			None => {
				self.slots.push(Some(record));
				self.slots.len() - 1
			}
		};

		if let Some(tail) = self.tail {
			self.record_at_mut(tail).next = Some(slot);
		} else {
			self.head = Some(slot);
		}
		self.tail = Some(slot);
		self.current = Some(slot);
		self.index.insert(id.clone(), slot);
		self.len += 1;

		tracing::debug!(key_id = %id, "Added key to ring");
		Ok(())
	}

	/// Fetch the raw key for `id`.
	///
	/// # Errors
	///
	/// [`Error::KeyNotFound`] for an unknown id, [`Error::KeyRevoked`] if the
	/// record exists but has been revoked.  Revoked keys refuse to hand out
	/// their bytes through this path; callers that need metadata for revoked
	/// records use [`KeyRing::record`] instead.
	pub fn key_bytes(&self, id: &KeyId) -> Result<Key, Error> {
		let record = self.record(id).ok_or_else(|| Error::key_not_found(id))?;

		if record.revoked {
			return Err(Error::key_revoked(id));
		}

		Ok(record.key.clone())
	}

	/// Raw record lookup, bypassing the revocation check.
	pub fn record(&self, id: &KeyId) -> Option<&KeyRecord> {
		self.index.get(id).map(|&slot| self.record_at(slot))
	}

	/// Soft-delete a key.  The record stays in the chain and the index so old
	/// ciphertext remains attributable, but it will no longer decrypt.  The
	/// `current` pointer is deliberately left alone, even when it points at
	/// the key being revoked.
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn revoke(&mut self, id: &KeyId) -> Result<(), Error> {
		let slot = *self.index.get(id).ok_or_else(|| Error::key_not_found(id))?;

		let record = self.record_at_mut(slot);
		record.revoked = true;
		record.timestamp = Utc::now().timestamp();

		tracing::debug!(key_id = %id, "Revoked key");
		Ok(())
	}

	pub fn current(&self) -> Option<&KeyRecord> {
		self.current.map(|slot| self.record_at(slot))
	}

	pub fn set_current(&mut self, id: &KeyId) -> Result<(), Error> {
		let slot = *self.index.get(id).ok_or_else(|| Error::key_not_found(id))?;

		if self.record_at(slot).revoked {
			return Err(Error::key_revoked(id));
		}

		self.current = Some(slot);
		Ok(())
	}

	/// Creation-order snapshot of the non-revoked records.
	pub fn active(&self) -> Vec<KeySummary> {
		self.summarize(|r| !r.revoked)
	}

	/// Creation-order snapshot of the revoked records.
	pub fn revoked(&self) -> Vec<KeySummary> {
		self.summarize(|r| r.revoked)
	}

	pub fn len(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Unlink and drop every revoked record older than `max_age`, returning
	/// how many were removed.  If the current key is among them, `current`
	/// moves to the new tail (or clears, if the ring empties).
	#[tracing::instrument(level = "debug", skip(self))]
	pub fn prune(&mut self, max_age: Duration) -> usize {
		let cutoff = Utc::now().timestamp() - max_age.as_secs() as i64;
		let mut removed = 0;

		let mut cursor = self.head;
		while let Some(slot) = cursor {
			let (next, stale) = {
				let record = self.record_at(slot);
				(record.next, record.revoked && record.timestamp < cutoff)
			};

			if stale {
				self.unlink(slot);
				removed += 1;
			}

			cursor = next;
		}

		removed
	}

	/// Metadata-only manifest of the active records: ids and sorted field
	/// lists, never key bytes.  The full export (with key material) is
	/// [`FieldVault::all_keys`](crate::FieldVault::all_keys).
	pub fn export_manifest(&self) -> KeyManifest {
		let mut manifest = KeyManifest::default();

		let mut cursor = self.head;
		while let Some(slot) = cursor {
			let record = self.record_at(slot);

			if !record.revoked {
				for field in &record.fields {
					manifest.field_map.insert(field.clone(), record.id.clone());
				}

				manifest.keys.insert(
					record.id.clone(),
					ShareableKey {
						key_id: record.id.clone(),
						key: None,
						fields: record.fields.iter().cloned().collect(),
					},
				);
			}

			cursor = record.next;
		}

		manifest
	}

	pub fn stats(&self) -> KeyRingStats {
		let revoked = self.count(|r| r.revoked);

		KeyRingStats {
			total_keys: self.len,
			active_keys: self.len - revoked,
			revoked_keys: revoked,
			current_key_id: self.current().map(|r| r.id.clone()),
		}
	}

	/// Human-readable listing of the ring, oldest key first.  Presentation
	/// only; hosts print it, the ring never does.
	pub fn describe(&self) -> String {
		use std::fmt::Write as _;

		let rule = "=".repeat(70);
		let mut out = format!("{rule}\nKEY RING ({} keys)\n{rule}\n", self.len);

		for (pos, summary) in self.summarize(|_| true).iter().enumerate() {
			let status = if summary.revoked { "REVOKED" } else { "ACTIVE" };
			let marker = if summary.current { " [CURRENT]" } else { "" };

			let _ = writeln!(
				out,
				"{pos}. {}... - {status}{marker}\n   fields: {} - {:?}",
				summary.key_id.short(),
				summary.fields.len(),
				summary.fields,
			);
		}

		out.push_str(&rule);
		out
	}

	/// Record that `field`'s ciphertext is keyed to `id`.
	pub(crate) fn bind_field(&mut self, id: &KeyId, field: &str) -> Result<(), Error> {
		let slot = *self.index.get(id).ok_or_else(|| Error::key_not_found(id))?;
		self.record_at_mut(slot).fields.insert(field.to_string());
		Ok(())
	}

	/// Remove `field` from `id`'s field set (rotation, or re-load under a
	/// different key).
	pub(crate) fn unbind_field(&mut self, id: &KeyId, field: &str) {
		if let Some(&slot) = self.index.get(id) {
			self.record_at_mut(slot).fields.remove(field);
		}
	}

	fn unlink(&mut self, slot: usize) {
		let Some(record) = self.slots[slot].take() else {
			return;
		};

		match record.prev {
			Some(prev) => self.record_at_mut(prev).next = record.next,
			None => self.head = record.next,
		}
		match record.next {
			Some(next) => self.record_at_mut(next).prev = record.prev,
			None => self.tail = record.prev,
		}

		self.index.remove(&record.id);
		self.free.push(slot);
		self.len -= 1;

		if self.current == Some(slot) {
			self.current = self.tail;
		}

		tracing::debug!(key_id = %record.id, "Pruned key from ring");
	}

	fn summarize(&self, want: impl Fn(&KeyRecord) -> bool) -> Vec<KeySummary> {
		let mut out = Vec::new();

		let mut cursor = self.head;
		while let Some(slot) = cursor {
			let record = self.record_at(slot);

			if want(record) {
				out.push(KeySummary {
					key_id: record.id.clone(),
					timestamp: record.timestamp,
					revoked: record.revoked,
					current: self.current == Some(slot),
					fields: record.fields.iter().cloned().collect(),
				});
			}

			cursor = record.next;
		}

		out
	}

	fn count(&self, want: impl Fn(&KeyRecord) -> bool) -> usize {
		let mut n = 0;

		let mut cursor = self.head;
		while let Some(slot) = cursor {
			let record = self.record_at(slot);
			if want(record) {
				n += 1;
			}
			cursor = record.next;
		}

		n
	}

	fn record_at(&self, slot: usize) -> &KeyRecord {
		self.slots[slot]
			.as_ref()
			.expect("linked slot must be occupied")
	}

	fn record_at_mut(&mut self, slot: usize) -> &mut KeyRecord {
		self.slots[slot]
			.as_mut()
			.expect("linked slot must be occupied")
	}

	// Shift a record's timestamp into the past, so prune tests don't have to
	// sleep through a real retention window
	#[cfg(test)]
	pub(crate) fn backdate(&mut self, id: &KeyId, secs: i64) {
		if let Some(&slot) = self.index.get(id) {
			self.record_at_mut(slot).timestamp -= secs;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn create_appends_and_becomes_current() {
		let mut ring = KeyRing::new();

		let first = ring.create_key();
		let second = ring.create_key();

		assert_eq!(2, ring.len());
		assert_eq!(&second, ring.current().unwrap().id());

		let order: Vec<KeyId> = ring.active().into_iter().map(|s| s.key_id).collect();
		assert_eq!(vec![first, second], order);
	}

	#[test]
	fn key_bytes_for_unknown_id() {
		let ring = KeyRing::new();

		let result = ring.key_bytes(&KeyId::generate());
		assert!(matches!(result, Err(Error::KeyNotFound(_))));
	}

	#[test]
	fn revoked_key_refuses_its_bytes() {
		let mut ring = KeyRing::new();
		let id = ring.create_key();

		ring.revoke(&id).unwrap();

		let result = ring.key_bytes(&id);
		assert!(matches!(result, Err(Error::KeyRevoked(_))));

		// Still attributable through the raw lookup
		assert!(ring.record(&id).unwrap().is_revoked());
	}

	#[test]
	fn revoking_current_leaves_current_alone() {
		let mut ring = KeyRing::new();
		let id = ring.create_key();

		ring.revoke(&id).unwrap();

		assert_eq!(&id, ring.current().unwrap().id());
	}

	#[test]
	fn set_current_rejects_revoked_and_unknown() {
		let mut ring = KeyRing::new();
		let old = ring.create_key();
		ring.create_key();

		ring.set_current(&old).unwrap();
		assert_eq!(&old, ring.current().unwrap().id());

		ring.revoke(&old).unwrap();
		assert!(matches!(ring.set_current(&old), Err(Error::KeyRevoked(_))));
		assert!(matches!(
			ring.set_current(&KeyId::generate()),
			Err(Error::KeyNotFound(_))
		));
	}

	#[test]
	fn active_and_revoked_partition_in_creation_order() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		let b = ring.create_key();
		let c = ring.create_key();

		ring.revoke(&b).unwrap();

		let active: Vec<KeyId> = ring.active().into_iter().map(|s| s.key_id).collect();
		let revoked: Vec<KeyId> = ring.revoked().into_iter().map(|s| s.key_id).collect();

		assert_eq!(vec![a, c], active);
		assert_eq!(vec![b], revoked);
	}

	#[test]
	fn prune_removes_only_stale_revoked_records() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		let b = ring.create_key();
		let c = ring.create_key();

		ring.revoke(&a).unwrap();
		ring.revoke(&b).unwrap();
		ring.backdate(&a, 3600);

		let removed = ring.prune(Duration::from_secs(60));

		assert_eq!(1, removed);
		assert_eq!(2, ring.len());
		assert!(ring.record(&a).is_none());
		assert!(ring.record(&b).is_some());
		assert!(ring.record(&c).is_some());
	}

	#[test]
	fn prune_rewires_head_tail_and_current() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		let b = ring.create_key();

		// Pruning the tail (which is also current) must move current back
		ring.revoke(&b).unwrap();
		ring.backdate(&b, 3600);
		assert_eq!(1, ring.prune(Duration::from_secs(60)));
		assert_eq!(&a, ring.current().unwrap().id());

		// Pruning the last record empties the ring entirely
		ring.revoke(&a).unwrap();
		ring.backdate(&a, 3600);
		assert_eq!(1, ring.prune(Duration::from_secs(60)));
		assert!(ring.is_empty());
		assert!(ring.current().is_none());
		assert!(ring.active().is_empty());
	}

	#[test]
	fn slots_are_reused_after_pruning() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		ring.revoke(&a).unwrap();
		ring.backdate(&a, 3600);
		ring.prune(Duration::from_secs(60));

		let b = ring.create_key();
		let c = ring.create_key();

		assert_eq!(2, ring.len());
		let order: Vec<KeyId> = ring.active().into_iter().map(|s| s.key_id).collect();
		assert_eq!(vec![b, c], order);
	}

	#[test]
	fn age_follows_the_record_timestamp() {
		let mut ring = KeyRing::new();
		let id = ring.create_key();

		assert!(!ring.record(&id).unwrap().is_older_than(Duration::from_secs(60)));

		ring.backdate(&id, 3600);

		let record = ring.record(&id).unwrap();
		assert!(record.age() >= Duration::from_secs(3600));
		assert!(record.is_older_than(Duration::from_secs(60)));
	}

	#[test]
	fn metadata_manifest_has_no_key_bytes() {
		let mut ring = KeyRing::new();
		let id = ring.create_key();
		ring.bind_field(&id, "email").unwrap();
		ring.bind_field(&id, "address").unwrap();

		let revoked = ring.create_key();
		ring.bind_field(&revoked, "phone").unwrap();
		ring.revoke(&revoked).unwrap();

		let manifest = ring.export_manifest();

		assert_eq!(1, manifest.keys.len());
		let entry = &manifest.keys[&id];
		assert!(entry.key.is_none());
		assert_eq!(vec!["address".to_string(), "email".to_string()], entry.fields);
		assert_eq!(Some(&id), manifest.field_map.get("email"));
		assert!(!manifest.field_map.contains_key("phone"));
	}

	#[test]
	fn stats_track_revocation() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		let b = ring.create_key();
		ring.revoke(&a).unwrap();

		let stats = ring.stats();
		assert_eq!(2, stats.total_keys);
		assert_eq!(1, stats.active_keys);
		assert_eq!(1, stats.revoked_keys);
		assert_eq!(Some(b), stats.current_key_id);
	}

	#[test]
	fn describe_marks_status_and_current() {
		let mut ring = KeyRing::new();
		let a = ring.create_key();
		ring.create_key();
		ring.revoke(&a).unwrap();

		let listing = ring.describe();
		assert!(listing.contains("KEY RING (2 keys)"));
		assert!(listing.contains("REVOKED"));
		assert!(listing.contains("[CURRENT]"));
	}
}
