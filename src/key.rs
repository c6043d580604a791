use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use secrecy::ExposeSecret as _;

use super::Error;

/// The raw material for one 256-bit field-encryption key.
///
/// Key bytes live in a [`secrecy::SecretBox`], so they're redacted from
/// `Debug` output and zeroed when the last owner drops them.  The bytes only
/// leave the box at the cipher boundary, or through [`Key::to_base64`] when a
/// key is deliberately exported for sharing.
#[derive(Debug)]
pub struct Key(secrecy::SecretBox<[u8; 32]>);

impl Key {
	pub(crate) fn expose_secret(&self) -> &[u8; 32] {
		self.0.expose_secret()
	}

	/// Render the key bytes as standard base64, for inclusion in an exported
	/// key manifest.  This is the one deliberate leak of key material out of
	/// the secrecy wrapper; handing the result to someone *is* handing them
	/// the key.
	pub fn to_base64(&self) -> String {
		BASE64.encode(self.expose_secret())
	}

	/// Reconstruct a key from the base64 form produced by [`Key::to_base64`].
	///
	/// # Errors
	///
	/// Returns [`Error::InvalidKey`] if the input isn't base64, or doesn't
	/// decode to exactly 32 bytes.
	pub fn from_base64(encoded: &str) -> Result<Self, Error> {
		let bytes = BASE64
			.decode(encoded)
			.map_err(|e| Error::invalid_key(format!("not base64: {e}")))?;

		let bytes: [u8; 32] = bytes
			.try_into()
			.map_err(|b: Vec<u8>| Error::invalid_key(format!("{} bytes, need 32", b.len())))?;

		Ok(Box::new(bytes).into())
	}
}

impl Clone for Key {
	fn clone(&self) -> Self {
		Self(Box::new(*self.expose_secret()).into())
	}
}

impl From<Box<[u8; 32]>> for Key {
	fn from(k: Box<[u8; 32]>) -> Self {
		Key(k.into())
	}
}

/// Generate a fresh random 256-bit key.
#[tracing::instrument(level = "debug")]
pub fn generate_key() -> Key {
	use rand::{RngCore, rng};

	let mut k = [0u8; 32];

	rng().fill_bytes(&mut k);

	Box::new(k).into()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base64_round_trip() {
		let key = generate_key();

		let restored = Key::from_base64(&key.to_base64()).unwrap();

		assert_eq!(key.expose_secret(), restored.expose_secret());
	}

	#[test]
	fn rejects_wrong_length() {
		let result = Key::from_base64(&BASE64.encode([0u8; 16]));
		assert!(matches!(result, Err(Error::InvalidKey(_))));
	}

	#[test]
	fn rejects_garbage() {
		let result = Key::from_base64("definitely not base64!!!");
		assert!(matches!(result, Err(Error::InvalidKey(_))));
	}

	#[test]
	fn debug_shows_no_bytes() {
		let key = generate_key();
		let debugged = format!("{key:?}");

		assert!(!debugged.contains(&key.to_base64()));
	}
}
