use std::io;
use std::net;

pub type NetworkResult<T> = Result<T, NetworkError>;

/// Errors on the network path. `Wait` means the operation cannot make
/// progress right now (it would block) and should be retried on the next
/// readiness event; everything else is fatal for the connection.
#[derive(Debug, Eq, PartialEq)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorType {
    AddrParse,
    /// Peer performed an orderly shutdown.
    Closed,
    /// Frame length prefix exceeded the design ceiling.
    FrameOversize,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            io::ErrorKind::UnexpectedEof => NetworkError::Fatal(ErrorType::Closed),
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(NetworkError::Wait) => false,
            _ => true,
        }
    }
}
