//! Frame layout.
//!
//! ```text
//! wire:      length:u32 || ciphertext[length]      (ciphertext includes the tag)
//! plaintext: sequence:u32 || payload
//! ```

use crate::error::FramingError;

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the big-endian sequence number at the start of every plaintext.
pub const SEQ_LEN: usize = 4;

/// Size of the Poly1305 authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Sequence number meaning "no response expected".
pub const NO_RESPONSE: u32 = 0;

/// A decoded plaintext frame borrowed from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    pub seq: u32,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Split a decrypted plaintext into sequence number and payload.
    pub fn decode(plaintext: &'a [u8]) -> Result<Self, FramingError> {
        if plaintext.len() < SEQ_LEN {
            return Err(FramingError::FrameTooShort {
                len: plaintext.len(),
                min: SEQ_LEN,
            });
        }
        let (seq, payload) = plaintext.split_at(SEQ_LEN);
        let seq = u32::from_be_bytes([seq[0], seq[1], seq[2], seq[3]]);
        Ok(Self { seq, payload })
    }

    /// True for frames that expect no response.
    pub fn is_message(&self) -> bool {
        self.seq == NO_RESPONSE
    }
}

/// Append `seq || payload` to `out`.
pub fn encode_plaintext(seq: u32, payload: &[u8], out: &mut Vec<u8>) {
    out.reserve(SEQ_LEN + payload.len() + TAG_LEN);
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(payload);
}

/// Validate a declared ciphertext length against the read buffer size.
///
/// `max_plaintext` is the largest plaintext (sequence + payload) the reader accepts.
pub fn check_ciphertext_len(len: usize, max_plaintext: usize) -> Result<(), FramingError> {
    let min = TAG_LEN + SEQ_LEN;
    if len < min {
        return Err(FramingError::FrameTooShort { len, min });
    }
    let max = max_plaintext + TAG_LEN;
    if len > max {
        return Err(FramingError::FrameTooLarge { len, max });
    }
    Ok(())
}

/// Validate an outbound payload against the write buffer size.
pub fn check_payload_len(len: usize, max_plaintext: usize) -> Result<(), FramingError> {
    let max = max_plaintext.saturating_sub(SEQ_LEN);
    if len > max {
        return Err(FramingError::PayloadTooLarge { len, max });
    }
    Ok(())
}
