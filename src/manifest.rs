//! The persisted artifacts: the encrypted record, and the key manifest.
//!
//! The two files are different-sensitivity material, by design.  The
//! encrypted record alone is not decryptable -- it carries ciphertexts and
//! key *ids*, never key bytes.  The key manifest is the dangerous one: it
//! holds base64 key material and must be stored and transmitted accordingly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{KeyId, SealedField};

/// One exported key: its id, optionally the key bytes themselves, and the
/// full sorted list of field names it currently unlocks.
///
/// `key` is `None` in the registry's metadata-only manifest (audit and
/// display use) and present in the orchestrator's full export.  Handing a
/// populated `ShareableKey` to a recipient grants them every field in
/// `fields` -- in single-key mode, that's the whole record.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ShareableKey {
	pub key_id: KeyId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub key: Option<String>,
	pub fields: Vec<String>,
}

/// Every shareable key, de-duplicated by id, plus the flattened
/// field-name → key-id map.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct KeyManifest {
	pub keys: BTreeMap<KeyId, ShareableKey>,
	pub field_map: BTreeMap<String, KeyId>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct RecordMetadata {
	pub total_fields: usize,
	pub total_keys: usize,
}

/// The complete persisted encrypted record.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct EncryptedRecord {
	pub encrypted_data: BTreeMap<String, SealedField>,
	pub field_key_map: BTreeMap<String, KeyId>,
	pub metadata: RecordMetadata,
}

/// A single field packaged for out-of-band transmission: the sealed entry as
/// a JSON string, plus the id and base64 bytes of the key that opens it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FieldExport {
	pub field: String,
	pub encrypted_data: String,
	pub key_id: KeyId,
	pub key: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn metadata_only_key_serializes_without_key_field() {
		let shareable = ShareableKey {
			key_id: KeyId::generate(),
			key: None,
			fields: vec!["email".to_string()],
		};

		let json = serde_json::to_string(&shareable).unwrap();
		assert!(!json.contains("\"key\":"));
	}

	#[test]
	fn record_wire_shape() {
		let record = EncryptedRecord::default();

		let json = serde_json::to_value(&record).unwrap();
		assert!(json.get("encrypted_data").is_some());
		assert!(json.get("field_key_map").is_some());
		assert_eq!(0, json["metadata"]["total_fields"]);
	}
}
