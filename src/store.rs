//! Opaque JSON persistence for the record and manifest artifacts.

use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

use super::Error;

/// Serialize `value` as pretty-printed JSON and write it to `path`.
#[tracing::instrument(level = "debug", skip(value))]
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
	let json = serde_json::to_vec_pretty(value)
		.map_err(|e| Error::serialization(path.display().to_string(), e))?;

	std::fs::write(path, json).map_err(|e| Error::io(path.display().to_string(), e))?;

	tracing::debug!(path = %path.display(), "Wrote JSON artifact");
	Ok(())
}

/// Read and deserialize a JSON artifact from `path`.
#[tracing::instrument(level = "debug")]
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
	let raw =
		std::fs::read(path).map_err(|e| Error::io(path.display().to_string(), e))?;

	serde_json::from_slice(&raw).map_err(|e| Error::serialization(path.display().to_string(), e))
}
