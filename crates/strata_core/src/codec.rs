//! # Subject State Codec
//!
//! Encodes out-of-band subject state into the bytes stored in the
//! `old_state`/`new_state` columns. The empty byte sequence is reserved for
//! "no extra state" and always round-trips to the codec's empty state.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::{CoreError, CoreResult};
use crate::subject::StateBlob;

/// Two-way mapping between an opaque state and its persisted bytes.
pub trait StateCodec: Send + Sync {
    /// In-memory state type.
    type State;

    /// Encodes a state. `None` encodes to the empty sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the state cannot be encoded.
    fn encode(&self, state: Option<&Self::State>) -> CoreResult<StateBlob>;

    /// Decodes persisted bytes. The empty sentinel decodes to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Codec`] if the bytes are corrupt.
    fn decode(&self, blob: &StateBlob) -> CoreResult<Option<Self::State>>;
}

/// LZ4-compressed raw bytes, size-prefixed.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lz4StateCodec;

impl StateCodec for Lz4StateCodec {
    type State = Vec<u8>;

    fn encode(&self, state: Option<&Vec<u8>>) -> CoreResult<StateBlob> {
        match state {
            Some(raw) if !raw.is_empty() => Ok(StateBlob::from_bytes(compress_prepend_size(raw))),
            _ => Ok(StateBlob::empty()),
        }
    }

    fn decode(&self, blob: &StateBlob) -> CoreResult<Option<Vec<u8>>> {
        if blob.is_empty() {
            return Ok(None);
        }
        decompress_size_prepended(blob.as_bytes())
            .map(Some)
            .map_err(|e| CoreError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_round_trip() {
        let codec = Lz4StateCodec;
        let state: Vec<u8> = b"{Items:[{Slot:0b,id:\"minecraft:diamond\",Count:64b}]}"
            .repeat(8);
        let blob = codec.encode(Some(&state)).unwrap();
        assert!(!blob.is_empty());
        assert!(blob.as_bytes().len() < state.len());
        assert_eq!(codec.decode(&blob).unwrap(), Some(state));
    }

    #[test]
    fn test_empty_is_the_no_state_sentinel() {
        let codec = Lz4StateCodec;
        assert!(codec.encode(None).unwrap().is_empty());
        assert!(codec.encode(Some(&Vec::new())).unwrap().is_empty());
        assert_eq!(codec.decode(&StateBlob::empty()).unwrap(), None);
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let codec = Lz4StateCodec;
        let blob = StateBlob::from_bytes(vec![10, 0, 0, 0, 0x50]);
        assert!(matches!(codec.decode(&blob), Err(CoreError::Codec(_))));
    }
}
