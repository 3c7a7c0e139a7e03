use std::fmt;
use std::io;

use http::StatusCode;

/// Error type for outcall
#[derive(Debug)]
#[allow(missing_docs)]
#[non_exhaustive]
pub enum Error {
    Io(io::Error),
    BadUri(String),
    UnsupportedScheme(String),
    BadHeader(String),
    AlreadyConnected,
    OutputAfterInput,
    HttpStatus(StatusCode),
    ExchangeFailed(String),
    BadLocationHeader(String),
    TooManyRedirects(u32),
    UnsupportedVersion,
    HttpParseFail(String),
    HttpParseTooManyHeaders,
    BadContentLengthHeader,
    ChunkLenNotAscii,
    ChunkLenNotANumber,
    ChunkExpectedCrLf,
    Tls(String),
    UnmappableCharacter(&'static str),
}

impl Error {
    /// Tell if this error is a connect or read timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        // Body readers tunnel framing errors through io::Error.
        let is_ours = value.get_ref().map(|e| e.is::<Error>()).unwrap_or(false);
        if !is_ours {
            return Error::Io(value);
        }

        let kind = value.kind();
        match value.into_inner().map(|e| e.downcast::<Error>()) {
            Some(Ok(e)) => *e,
            Some(Err(e)) => Error::Io(io::Error::new(kind, e)),
            None => Error::Io(kind.into()),
        }
    }
}

impl From<httparse::Error> for Error {
    fn from(value: httparse::Error) -> Self {
        Error::HttpParseFail(value.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Io(e) => e,
            Error::ChunkLenNotAscii
            | Error::ChunkLenNotANumber
            | Error::ChunkExpectedCrLf
            | Error::BadContentLengthHeader
            | Error::HttpParseFail(_)
            | Error::HttpParseTooManyHeaders
            | Error::UnsupportedVersion => io::Error::new(io::ErrorKind::InvalidData, value),
            _ => io::Error::new(io::ErrorKind::Other, value),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "io: {}", e),
            Error::BadUri(v) => write!(f, "bad uri: {}", v),
            Error::UnsupportedScheme(v) => write!(f, "unsupported scheme: {}", v),
            Error::BadHeader(v) => write!(f, "bad header: {}", v),
            Error::AlreadyConnected => write!(f, "connection already started"),
            Error::OutputAfterInput => write!(f, "cannot write output after reading input"),
            Error::HttpStatus(v) => write!(f, "server returned http status {}", v),
            Error::ExchangeFailed(v) => write!(f, "previous exchange failed: {}", v),
            Error::BadLocationHeader(v) => write!(f, "location header is malformed: {}", v),
            Error::TooManyRedirects(v) => write!(f, "more than {} redirects", v),
            Error::UnsupportedVersion => write!(f, "unsupported http version"),
            Error::HttpParseFail(v) => write!(f, "http parse fail: {}", v),
            Error::HttpParseTooManyHeaders => write!(f, "http parse resulted in too many headers"),
            Error::BadContentLengthHeader => write!(f, "content-length header not a number"),
            Error::ChunkLenNotAscii => write!(f, "chunk length is not ascii"),
            Error::ChunkLenNotANumber => write!(f, "chunk length cannot be read as a number"),
            Error::ChunkExpectedCrLf => write!(f, "chunk expected crlf as next character"),
            Error::Tls(v) => write!(f, "tls: {}", v),
            Error::UnmappableCharacter(v) => {
                write!(f, "text cannot be represented in charset {}", v)
            }
        }
    }
}
