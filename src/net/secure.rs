//! Authenticated-encrypted framed stream.
//!
//! # Responsibilities
//! - Seal outbound `(seq, payload)` into `length || ciphertext`
//! - Bound-check, read and open inbound frames
//! - Own the per-direction nonce counter; never reuse a nonce
//!
//! # Design Decisions
//! - One session key, two nonce spaces: the first nonce byte is the direction
//! - The length prefix is bound into the tag as associated data
//! - Each half owns its own cipher so reader and writer never share state

use std::fmt;

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};

use crate::error::{CryptoError, FramingError, Result};
use crate::protocol::frame::{self, Frame, LENGTH_PREFIX_LEN, TAG_LEN};

/// Size of a derived session key.
pub const KEY_LEN: usize = 32;

const NONCE_LEN: usize = 12;

/// Which side of the handshake this endpoint played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn outbound(self) -> Direction {
        match self {
            Role::Client => Direction::ClientToServer,
            Role::Server => Direction::ServerToClient,
        }
    }

    fn inbound(self) -> Direction {
        match self {
            Role::Client => Direction::ServerToClient,
            Role::Server => Direction::ClientToServer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    ClientToServer = 0,
    ServerToClient = 1,
}

/// Symmetric key shared by both ends after the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0 = [0; KEY_LEN];
    }
}

/// Largest plaintext (sequence + payload) accepted in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_read_plaintext: usize,
    pub max_write_plaintext: usize,
}

/// ChaCha20-Poly1305 bound to one direction of one connection.
pub(crate) struct ChannelCipher {
    aead: ChaCha20Poly1305,
    direction: Direction,
    counter: u64,
}

impl ChannelCipher {
    pub(crate) fn new(key: &SessionKey, direction: Direction) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            direction,
            counter: 0,
        }
    }

    /// `direction || 0x000000 || counter_be`. Fails instead of wrapping.
    pub(crate) fn next_nonce(&mut self) -> Result<[u8; NONCE_LEN], CryptoError> {
        if self.counter == u64::MAX {
            return Err(CryptoError::NonceExhausted);
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce[0] = self.direction as u8;
        nonce[4..].copy_from_slice(&self.counter.to_be_bytes());
        self.counter += 1;
        Ok(nonce)
    }

    fn seal(&mut self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), CryptoError> {
        let nonce = self.next_nonce()?;
        self.aead
            .encrypt_in_place(Nonce::from_slice(&nonce), aad, buf)
            .map_err(|_| CryptoError::Authentication)
    }

    fn open(&mut self, aad: &[u8], buf: &mut Vec<u8>) -> Result<(), CryptoError> {
        let nonce = self.next_nonce()?;
        self.aead
            .decrypt_in_place(Nonce::from_slice(&nonce), aad, buf)
            .map_err(|_| CryptoError::Authentication)
    }

    #[cfg(test)]
    pub(crate) fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }
}

/// Read half of a secured stream.
pub struct SecureReader<R> {
    inner: BufReader<R>,
    cipher: ChannelCipher,
    max_plaintext: usize,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    /// Read and authenticate one frame into `buf`.
    ///
    /// Returns `Ok(None)` on a clean EOF at a frame boundary.
    pub async fn read_frame<'a>(&mut self, buf: &'a mut Vec<u8>) -> Result<Option<Frame<'a>>> {
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        if self.inner.read(&mut prefix[..1]).await? == 0 {
            return Ok(None);
        }
        self.inner.read_exact(&mut prefix[1..]).await?;

        let len = u32::from_be_bytes(prefix) as usize;
        frame::check_ciphertext_len(len, self.max_plaintext)?;

        buf.clear();
        buf.resize(len, 0);
        self.inner.read_exact(buf).await?;
        self.cipher.open(&prefix, buf)?;

        Ok(Some(Frame::decode(buf.as_slice())?))
    }
}

/// Write half of a secured stream.
pub struct SecureWriter<W> {
    inner: BufWriter<W>,
    cipher: ChannelCipher,
    scratch: Vec<u8>,
    max_plaintext: usize,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    /// Seal and buffer one frame. Nothing reaches the socket until `flush`
    /// or until the buffer fills.
    pub async fn write_frame(&mut self, seq: u32, payload: &[u8]) -> Result<()> {
        frame::check_payload_len(payload.len(), self.max_plaintext)?;

        self.scratch.clear();
        frame::encode_plaintext(seq, payload, &mut self.scratch);

        let len = self.scratch.len() + TAG_LEN;
        let prefix = u32::try_from(len)
            .map_err(|_| FramingError::PayloadTooLarge {
                len: payload.len(),
                max: self.max_plaintext,
            })?
            .to_be_bytes();
        self.cipher.seal(&prefix, &mut self.scratch)?;

        self.inner.write_all(&prefix).await?;
        self.inner.write_all(&self.scratch).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and shut down the write direction.
    pub async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// A byte stream wrapped with authenticated encryption.
///
/// Produced by a [`Handshaker`](super::handshake::Handshaker); split into halves
/// so reading and writing can proceed concurrently.
pub struct SecureStream<S> {
    reader: SecureReader<ReadHalf<S>>,
    writer: SecureWriter<WriteHalf<S>>,
}

impl<S: AsyncRead + AsyncWrite> SecureStream<S> {
    pub(crate) fn new(stream: S, key: &SessionKey, role: Role, limits: FrameLimits) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let reader = SecureReader {
            inner: BufReader::with_capacity(
                limits.max_read_plaintext + LENGTH_PREFIX_LEN + TAG_LEN,
                read_half,
            ),
            cipher: ChannelCipher::new(key, role.inbound()),
            max_plaintext: limits.max_read_plaintext,
        };
        let writer = SecureWriter {
            inner: BufWriter::with_capacity(
                limits.max_write_plaintext + LENGTH_PREFIX_LEN + TAG_LEN,
                write_half,
            ),
            cipher: ChannelCipher::new(key, role.outbound()),
            scratch: Vec::with_capacity(limits.max_write_plaintext + TAG_LEN),
            max_plaintext: limits.max_write_plaintext,
        };
        Self { reader, writer }
    }

    pub fn into_split(self) -> (SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureStream<S> {
    pub async fn read_frame<'a>(&mut self, buf: &'a mut Vec<u8>) -> Result<Option<Frame<'a>>> {
        self.reader.read_frame(buf).await
    }

    pub async fn write_frame(&mut self, seq: u32, payload: &[u8]) -> Result<()> {
        self.writer.write_frame(seq, payload).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.writer.close().await
    }
}
