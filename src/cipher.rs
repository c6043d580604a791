//! The cipher boundary: ChaCha20-Poly1305 seal/open for one field value.
//!
//! Everything above this module deals in [`SealedField`]s; everything below
//! it is the AEAD primitive.  A fresh random 96-bit nonce is drawn for every
//! seal, and never derived from the content -- nonce reuse under one key
//! would be fatal to the whole scheme.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chacha20poly1305::{
	ChaCha20Poly1305, KeyInit as _,
	aead::Aead as _,
};
use rand::{RngCore, rng};
use serde::{Deserialize, Serialize};

use super::{Error, Key, ValueKind};

/// One encrypted field, exactly as it appears in the persisted record:
/// base64 nonce, base64 ciphertext (including the Poly1305 tag), and the
/// shape tag that tells decryption how to interpret the plaintext.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SealedField {
	pub nonce: String,
	pub ciphertext: String,
	#[serde(rename = "type")]
	pub kind: ValueKind,
}

/// Seal one field's canonical plaintext under `key`.
#[tracing::instrument(level = "trace", skip(plaintext, key))]
pub(crate) fn seal(plaintext: &[u8], kind: ValueKind, key: &Key) -> Result<SealedField, Error> {
	let cipher = ChaCha20Poly1305::new(key.expose_secret().into());

	let mut nonce = [0u8; 12];
	rng().fill_bytes(&mut nonce);

	let ciphertext = cipher
		.encrypt((&nonce).into(), plaintext)
		.map_err(|_| Error::Encryption)?;

	Ok(SealedField {
		nonce: BASE64.encode(nonce),
		ciphertext: BASE64.encode(ciphertext),
		kind,
	})
}

/// Open a sealed field, returning the canonical plaintext.
///
/// # Errors
///
/// [`Error::InvalidCiphertext`] if the stored entry is malformed (bad base64,
/// wrong-sized nonce); [`Error::Decryption`] if authentication fails, which
/// covers both tampering and a wrong key.  No partial plaintext ever escapes.
#[tracing::instrument(level = "trace", skip(sealed, key))]
pub(crate) fn open(sealed: &SealedField, key: &Key) -> Result<Vec<u8>, Error> {
	let nonce = BASE64
		.decode(&sealed.nonce)
		.map_err(|_| Error::invalid_ciphertext("nonce is not base64"))?;
	let nonce: [u8; 12] = nonce
		.try_into()
		.map_err(|_| Error::invalid_ciphertext("nonce is not 12 bytes"))?;

	let ciphertext = BASE64
		.decode(&sealed.ciphertext)
		.map_err(|_| Error::invalid_ciphertext("ciphertext is not base64"))?;

	let cipher = ChaCha20Poly1305::new(key.expose_secret().into());

	cipher
		.decrypt((&nonce).into(), ciphertext.as_slice())
		.map_err(|_| Error::Decryption)
}
