//! Chunked transfer codec.
//!
//! Payload bytes travel through the shared channel packed four to a 32-bit
//! word, little-endian: byte `i` of a chunk lives in word `i / 4` (word
//! `1 + i / 4` of the channel) at bit offset `8 * (i % 4)`. The codec works
//! on raw bytes, so multi-byte UTF-8 sequences split across two chunks are
//! reassembled intact by concatenating the decoded chunks.

/// Number of words needed to carry `len` bytes.
pub fn words_for(len: usize) -> usize {
    len.div_ceil(4)
}

/// Packs up to four bytes into one word. Missing high bytes are zero.
pub fn pack_word(bytes: &[u8]) -> u32 {
    debug_assert!(bytes.len() <= 4, "a word carries at most four bytes");
    let mut buf = [0u8; 4];
    buf[..bytes.len()].copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

/// Encodes at most `max_bytes` of `data`, starting at `offset`.
///
/// Returns the packed words and the number of bytes they carry. An offset at
/// or past the end of `data` encodes nothing.
pub fn encode(data: &[u8], offset: usize, max_bytes: usize) -> (Vec<u32>, usize) {
    let start = offset.min(data.len());
    let count = max_bytes.min(data.len() - start);
    let words = data[start..start + count]
        .chunks(4)
        .map(pack_word)
        .collect();
    (words, count)
}

/// Decodes `byte_count` bytes from `words`.
///
/// Bytes of the last word beyond `byte_count` are padding and are dropped.
pub fn decode(words: &[u32], byte_count: usize) -> Vec<u8> {
    debug_assert!(words.len() * 4 >= byte_count, "not enough words for byte count");
    let mut out = Vec::with_capacity(byte_count);
    for word in words {
        if out.len() >= byte_count {
            break;
        }
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.truncate(byte_count);
    out
}
