use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors returned by the resolver, its clients and the dispatcher.
///
/// The wire codec itself reports problems as [`io::Error`]s of kind
/// [`io::ErrorKind::InvalidData`], see [`bail!`](crate::bail).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("timed out waiting for a response from {0}")]
    Timeout(SocketAddr),

    #[error("malformed message: {0}")]
    Malformed(io::Error),

    #[error("response id {got} does not match query id {want}")]
    IdMismatch { want: u16, got: u16 },

    #[error("query contains no question")]
    NoQuestion,

    #[error("trace logger is no longer running")]
    TraceClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returns early with an [`io::Error`] of the given kind and formatted message.
#[macro_export]
macro_rules! bail {
    ($kind:ident, $($arg:tt)*) => {{
        return Err(std::io::Error::new(
            std::io::ErrorKind::$kind,
            format!($($arg)*),
        ));
    }};
}
