#[derive(Debug, thiserror::Error, thiserror_ext::Construct)]
#[non_exhaustive]
pub enum Error {
	#[error("failed to decrypt field ciphertext")]
	Decryption,

	#[error("failed to encrypt field plaintext")]
	Encryption,

	#[error("no field named '{0}'")]
	FieldNotFound(String),

	#[error("no key with id {0}")]
	KeyNotFound(String),

	#[error("key {0} is revoked")]
	KeyRevoked(String),

	#[error("record contains no fields")]
	EmptyRecord,

	#[error("invalid key: {0}")]
	InvalidKey(String),

	#[error("invalid ciphertext: {0}")]
	InvalidCiphertext(String),

	#[error("serialization failure on {element}: {cause}")]
	Serialization {
		element: String,
		cause: serde_json::Error,
	},

	#[error("I/O failure on {path}: {cause}")]
	Io { path: String, cause: std::io::Error },
}
