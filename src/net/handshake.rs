//! Ephemeral X25519 handshake.
//!
//! Both roles run the same exchange:
//! ```text
//! generate ephemeral (s, P = sG)
//! send P (32 bytes), flush, receive peer P' (32 bytes)
//! shared = s · P'          (rejected if non-contributory)
//! key    = HKDF-SHA256(shared, info = LABEL || client_P || server_P)
//! ```
//! The role only decides the order of public keys in the KDF info and which
//! nonce direction each half of the resulting stream uses.

use std::future::Future;

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::error::{CryptoError, Result};
use crate::net::secure::{FrameLimits, Role, SecureStream, SessionKey, KEY_LEN};

/// Size of an X25519 public key on the wire.
pub const PUBLIC_KEY_LEN: usize = 32;

const KDF_LABEL: &[u8] = b"monte v1 session key";

/// Turns a raw byte stream into a [`SecureStream`].
pub trait Handshaker: Send + Sync + 'static {
    /// Run the exchange over `stream`. Any I/O error aborts the handshake.
    ///
    /// The caller owns the deadline; this never times out on its own.
    fn handshake<S>(&self, stream: S) -> impl Future<Output = Result<SecureStream<S>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send;
}

/// Handshaker for the dialing side.
#[derive(Debug, Clone)]
pub struct ClientHandshaker {
    limits: FrameLimits,
}

impl ClientHandshaker {
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }
}

impl Handshaker for ClientHandshaker {
    fn handshake<S>(&self, stream: S) -> impl Future<Output = Result<SecureStream<S>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        exchange(stream, Role::Client, self.limits)
    }
}

/// Handshaker for the accepting side.
#[derive(Debug, Clone)]
pub struct ServerHandshaker {
    limits: FrameLimits,
}

impl ServerHandshaker {
    pub fn new(limits: FrameLimits) -> Self {
        Self { limits }
    }
}

impl Handshaker for ServerHandshaker {
    fn handshake<S>(&self, stream: S) -> impl Future<Output = Result<SecureStream<S>>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        exchange(stream, Role::Server, self.limits)
    }
}

async fn exchange<S>(mut stream: S, role: Role, limits: FrameLimits) -> Result<SecureStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let secret = EphemeralSecret::random_from_rng(OsRng);
    let local = PublicKey::from(&secret);

    stream.write_all(local.as_bytes()).await?;
    stream.flush().await?;

    let mut peer = [0u8; PUBLIC_KEY_LEN];
    stream.read_exact(&mut peer).await?;
    let peer = PublicKey::from(peer);

    let shared = secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        tracing::debug!(?role, "Handshake rejected low-order peer key");
        return Err(CryptoError::NonContributory.into());
    }

    let (client_public, server_public) = match role {
        Role::Client => (local, peer),
        Role::Server => (peer, local),
    };
    let key = derive_session_key(
        shared.as_bytes(),
        client_public.as_bytes(),
        server_public.as_bytes(),
    )?;

    tracing::trace!(?role, "Handshake complete");
    Ok(SecureStream::new(stream, &key, role, limits))
}

/// HKDF-SHA256 over the shared secret, bound to both public keys.
pub fn derive_session_key(
    shared: &[u8; 32],
    client_public: &[u8; PUBLIC_KEY_LEN],
    server_public: &[u8; PUBLIC_KEY_LEN],
) -> Result<SessionKey, CryptoError> {
    let mut info = Vec::with_capacity(KDF_LABEL.len() + 2 * PUBLIC_KEY_LEN);
    info.extend_from_slice(KDF_LABEL);
    info.extend_from_slice(client_public);
    info.extend_from_slice(server_public);

    let mut okm = [0u8; KEY_LEN];
    Hkdf::<Sha256>::new(None, shared)
        .expand(&info, &mut okm)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(SessionKey::from_bytes(okm))
}
