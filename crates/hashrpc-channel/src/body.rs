//! Message body serialization.
//!
//! The envelope payload is opaque to framing and dispatch; a [`BodyCodec`] turns
//! typed messages into those bytes and back. Both endpoints must use the same codec.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Serializer for message bodies.
pub trait BodyCodec: 'static {
    /// Short name used in logs and CLI output.
    const NAME: &'static str;

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T>;
}

/// JSON bodies via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody;

impl BodyCodec for JsonBody {
    const NAME: &'static str = "json";

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Compact binary bodies via `bincode`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeBody;

impl BodyCodec for BincodeBody {
    const NAME: &'static str = "bincode";

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
