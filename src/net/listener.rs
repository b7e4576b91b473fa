//! Listener abstraction and accept-error classification.
//!
//! # Responsibilities
//! - Abstract over "something that yields raw streams" so the accept loop
//!   is testable without real sockets
//! - Decide whether an accept error ends the loop, is retried, or is fatal

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Source of raw inbound streams.
pub trait Accept: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Stream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    type Stream = TcpStream;

    fn accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// What the accept loop should do about an accept error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptErrorKind {
    /// Listener is gone; stop serving without error.
    Closed,
    /// Back off briefly and retry.
    Transient,
    /// Return the error to the caller.
    Fatal,
}

/// Classify an accept error.
pub fn classify_accept_error(err: &io::Error) -> AcceptErrorKind {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected => AcceptErrorKind::Closed,
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut
        | io::ErrorKind::OutOfMemory => AcceptErrorKind::Transient,
        _ if is_resource_exhaustion(err) => AcceptErrorKind::Transient,
        _ => AcceptErrorKind::Fatal,
    }
}

// EMFILE / ENFILE / ENOBUFS surface as uncategorized errors.
fn is_resource_exhaustion(err: &io::Error) -> bool {
    #[cfg(target_os = "linux")]
    const CODES: &[i32] = &[23, 24, 105];
    #[cfg(not(target_os = "linux"))]
    const CODES: &[i32] = &[];

    err.raw_os_error().is_some_and(|code| CODES.contains(&code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let closed = io::Error::from(io::ErrorKind::UnexpectedEof);
        assert_eq!(classify_accept_error(&closed), AcceptErrorKind::Closed);

        let aborted = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert_eq!(classify_accept_error(&aborted), AcceptErrorKind::Transient);

        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(classify_accept_error(&denied), AcceptErrorKind::Fatal);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn too_many_open_files_is_transient() {
        let emfile = io::Error::from_raw_os_error(24);
        assert_eq!(classify_accept_error(&emfile), AcceptErrorKind::Transient);
    }
}
