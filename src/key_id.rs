use serde::{Deserialize, Serialize};

/// Identifier for one key record: 16 random bytes, rendered as 32 lowercase
/// hex characters.
///
/// The id is generated, not derived from the key material, so knowing an id
/// tells you nothing about the key.  128 bits of entropy makes collisions a
/// non-event within a process lifetime.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
	pub(crate) fn generate() -> Self {
		use rand::{RngCore, rng};

		let mut raw = [0u8; 16];
		rng().fill_bytes(&mut raw);

		Self(raw.iter().map(|b| format!("{b:02x}")).collect())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	// First few hex chars, for log lines and display listings.  Falls back
	// to the whole id rather than slicing mid-char, since deserialized ids
	// are arbitrary strings until validated
	pub(crate) fn short(&self) -> &str {
		self.0.get(..12).unwrap_or(&self.0)
	}

	/// Whether this id has the shape [`KeyId::generate`] produces: exactly
	/// 32 lowercase hex characters.  Ids arriving through deserialization
	/// haven't been checked; manifest import refuses any that fail this.
	pub(crate) fn is_well_formed(&self) -> bool {
		self.0.len() == 32 && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
	}
}

impl std::fmt::Display for KeyId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&KeyId> for String {
	fn from(id: &KeyId) -> Self {
		id.0.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn shape() {
		let id = KeyId::generate();

		assert_eq!(32, id.as_str().len());
		assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn ids_do_not_repeat() {
		let ids: std::collections::HashSet<KeyId> = (0..100).map(|_| KeyId::generate()).collect();

		assert_eq!(100, ids.len());
	}

	#[test]
	fn short_never_splits_a_char() {
		// Deserialization admits arbitrary strings, including multi-byte
		// ones whose 12th byte is mid-character
		let id: KeyId = serde_json::from_str("\"aééééééééé\"").unwrap();

		assert!(!id.is_well_formed());
		assert_eq!(id.as_str(), id.short());
	}

	#[test]
	fn well_formedness() {
		assert!(KeyId::generate().is_well_formed());

		for bad in ["", "abc", &"A".repeat(32), &"g".repeat(32), &"é".repeat(16)] {
			let id: KeyId = serde_json::from_str(&format!("\"{bad}\"")).unwrap();
			assert!(!id.is_well_formed(), "{bad:?} should be rejected");
		}
	}

	#[test]
	fn serializes_as_plain_string() {
		let id = KeyId::generate();

		assert_eq!(
			format!("\"{id}\""),
			serde_json::to_string(&id).unwrap()
		);
	}
}
