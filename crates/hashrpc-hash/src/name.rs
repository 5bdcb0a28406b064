use bytes::{BufMut, Bytes, BytesMut};

/// Size of the two length words that precede the UTF-8 text in a name key.
pub const NAME_KEY_HEADER: usize = 8;

/// Encode a type name into the byte key that is fed to the hash functions.
///
/// Deployed peers hash the length-prefixed string form of the name rather than its
/// bare UTF-8 text, so identifiers only match when the same layout is used:
///
/// ```text
/// ┌────────────────────┬──────────────────────┬──────────────┐
/// │ !utf8_len (i32 LE) │ utf16_len (i32 LE)   │ UTF-8 bytes  │
/// └────────────────────┴──────────────────────┴──────────────┘
/// ```
pub fn name_key(name: &str) -> Bytes {
    let utf8_len = i32::try_from(name.len()).unwrap_or(i32::MAX);
    let utf16_len = i32::try_from(name.encode_utf16().count()).unwrap_or(i32::MAX);

    let mut key = BytesMut::with_capacity(NAME_KEY_HEADER + name.len());
    key.put_i32_le(!utf8_len);
    key.put_i32_le(utf16_len);
    key.put_slice(name.as_bytes());
    key.freeze()
}
