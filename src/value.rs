use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Error;

/// One field value from the record being protected.
///
/// This is the closed set of shapes a field may take.  The distinction that
/// actually matters at decrypt time is string vs everything-else: strings are
/// sealed verbatim and returned verbatim, while structured values go through
/// a canonical JSON form (see [`FieldValue::to_plaintext`]).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
	Bool(bool),
	Number(f64),
	String(String),
	Sequence(Vec<FieldValue>),
	Mapping(BTreeMap<String, FieldValue>),
}

/// The shape tag stored alongside each ciphertext, so decryption knows
/// whether to hand back raw text or parse the plaintext as JSON.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
	String,
	Structured,
}

impl FieldValue {
	pub fn kind(&self) -> ValueKind {
		match self {
			FieldValue::String(_) => ValueKind::String,
			_ => ValueKind::Structured,
		}
	}

	/// The canonical byte form handed to the cipher.  Strings go through
	/// untouched; everything else is serialized as JSON (with map keys in
	/// sorted order, courtesy of `BTreeMap`), so re-encryption of the same
	/// logical value always seals the same plaintext.
	pub(crate) fn to_plaintext(&self) -> Result<Vec<u8>, Error> {
		match self {
			FieldValue::String(s) => Ok(s.clone().into_bytes()),
			v => serde_json::to_vec(v).map_err(|e| Error::serialization("field value", e)),
		}
	}

	/// Reverse [`FieldValue::to_plaintext`], guided by the stored shape tag.
	pub(crate) fn from_plaintext(plaintext: Vec<u8>, kind: ValueKind) -> Result<Self, Error> {
		match kind {
			// Authenticated plaintext of a string field is the string itself
			ValueKind::String => String::from_utf8(plaintext)
				.map(FieldValue::String)
				.map_err(|_| Error::Decryption),
			ValueKind::Structured => {
				serde_json::from_slice(&plaintext).map_err(|_| Error::Decryption)
			}
		}
	}
}

impl From<&str> for FieldValue {
	fn from(s: &str) -> Self {
		FieldValue::String(s.to_string())
	}
}

impl From<String> for FieldValue {
	fn from(s: String) -> Self {
		FieldValue::String(s)
	}
}

impl From<f64> for FieldValue {
	fn from(n: f64) -> Self {
		FieldValue::Number(n)
	}
}

impl From<i32> for FieldValue {
	fn from(n: i32) -> Self {
		FieldValue::Number(n.into())
	}
}

impl From<bool> for FieldValue {
	fn from(b: bool) -> Self {
		FieldValue::Bool(b)
	}
}

impl<V: Into<FieldValue>> FromIterator<V> for FieldValue {
	fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
		FieldValue::Sequence(iter.into_iter().map(Into::into).collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_mapping() -> FieldValue {
		FieldValue::Mapping(BTreeMap::from([
			("degree".to_string(), "BSc".into()),
			("year".to_string(), 2019.into()),
		]))
	}

	#[test]
	fn strings_pass_through_verbatim() {
		let v = FieldValue::from("alice@example.com");

		assert_eq!(ValueKind::String, v.kind());
		assert_eq!(b"alice@example.com".to_vec(), v.to_plaintext().unwrap());
	}

	#[test]
	fn structured_values_round_trip() {
		let v = sample_mapping();

		let plaintext = v.to_plaintext().unwrap();
		let restored = FieldValue::from_plaintext(plaintext, ValueKind::Structured).unwrap();

		assert_eq!(v, restored);
	}

	#[test]
	fn canonical_form_is_stable() {
		assert_eq!(
			sample_mapping().to_plaintext().unwrap(),
			sample_mapping().to_plaintext().unwrap()
		);
	}

	#[test]
	fn sequences_are_structured() {
		let v: FieldValue = ["Rust", "Go"].into_iter().collect();

		assert_eq!(ValueKind::Structured, v.kind());
	}

	#[test]
	fn untagged_serde_keeps_json_shape() {
		let v: FieldValue = serde_json::from_str(r#"{"a": [1, true, "x"]}"#).unwrap();

		let FieldValue::Mapping(m) = &v else {
			panic!("expected a mapping, got {v:?}");
		};
		assert!(matches!(m["a"], FieldValue::Sequence(_)));
		assert_eq!(r#"{"a":[1.0,true,"x"]}"#, serde_json::to_string(&v).unwrap());
	}

	#[test]
	fn mangled_structured_plaintext_is_a_decryption_failure() {
		let result = FieldValue::from_plaintext(b"{not json".to_vec(), ValueKind::Structured);
		assert!(matches!(result, Err(Error::Decryption)));
	}
}
