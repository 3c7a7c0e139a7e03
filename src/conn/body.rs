//! Request and response bodies.

use std::fmt;
use std::io::{self, BufRead, BufReader, Chain, Cursor, Read, Write};
use std::time::Duration;

use http::{header, HeaderMap, Method, StatusCode};

use super::stream::Stream;
use crate::Error;

/// Request body of an outcall.
///
/// Written data is buffered and sent with a `content-length` header once the
/// response is requested.
#[derive(Debug, Default)]
pub struct RequestBody {
    buf: Vec<u8>,
}

impl RequestBody {
    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Tell if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Write for RequestBody {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

type Source = BufReader<Chain<Cursor<Vec<u8>>, Stream>>;

/// Response body of an outcall.
///
/// Reading stops at the end of the body as framed by the response headers.
pub struct ResponseBody {
    source: Source,
    reader: BodyReader,
}

impl ResponseBody {
    /// `leftover` is input read past the response head.
    pub(crate) fn new(leftover: Vec<u8>, stream: Stream, reader: BodyReader) -> Self {
        ResponseBody {
            source: BufReader::new(Cursor::new(leftover).chain(stream)),
            reader,
        }
    }

    pub(crate) fn has_content(&self) -> bool {
        self.reader.has_content()
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.source.get_ref().get_ref().1.set_read_timeout(timeout)
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.reader.read(&mut self.source, buf)?)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody")
            .field("reader", &self.reader)
            .finish()
    }
}

/// How the response body is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyReader {
    NoBody,
    LengthDelimited(u64),
    Chunked(ChunkPhase),
    CloseDelimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkPhase {
    Size,
    Data(u64),
    DataEnd,
    Trailers,
    Ended,
}

impl BodyReader {
    pub fn for_response(
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
    ) -> Result<Self, Error> {
        let no_body = *method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;

        if no_body {
            return Ok(BodyReader::NoBody);
        }

        let is_chunked = headers
            .get_all(header::TRANSFER_ENCODING)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().eq_ignore_ascii_case("chunked"));

        // Transfer-encoding takes precedence over content-length.
        if is_chunked {
            return Ok(BodyReader::Chunked(ChunkPhase::Size));
        }

        if let Some(v) = headers.get(header::CONTENT_LENGTH) {
            let len = v
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or(Error::BadContentLengthHeader)?;
            return Ok(BodyReader::LengthDelimited(len));
        }

        Ok(BodyReader::CloseDelimited)
    }

    pub fn has_content(&self) -> bool {
        !matches!(
            self,
            BodyReader::NoBody | BodyReader::LengthDelimited(0)
        )
    }

    pub fn read(&mut self, src: &mut impl BufRead, output: &mut [u8]) -> Result<usize, Error> {
        if output.is_empty() {
            return Ok(0);
        }

        match self {
            BodyReader::NoBody => Ok(0),

            BodyReader::LengthDelimited(left) => {
                if *left == 0 {
                    return Ok(0);
                }
                let max = (*left).min(output.len() as u64) as usize;
                let n = src.read(&mut output[..max])?;
                if n == 0 {
                    return Err(unexpected_eof("response body shorter than content-length"));
                }
                *left -= n as u64;
                Ok(n)
            }

            BodyReader::CloseDelimited => match src.read(output) {
                // TLS peers closing without close_notify still end the body.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    debug!("Close delimited body ended without close_notify");
                    Ok(0)
                }
                r => Ok(r?),
            },

            BodyReader::Chunked(phase) => read_chunked(phase, src, output),
        }
    }
}

fn read_chunked(
    phase: &mut ChunkPhase,
    src: &mut impl BufRead,
    output: &mut [u8],
) -> Result<usize, Error> {
    loop {
        match *phase {
            ChunkPhase::Size => {
                let line = read_line(src)?;
                let len = parse_chunk_len(&line)?;
                *phase = if len == 0 {
                    ChunkPhase::Trailers
                } else {
                    ChunkPhase::Data(len)
                };
            }

            ChunkPhase::Data(left) => {
                let max = left.min(output.len() as u64) as usize;
                let n = src.read(&mut output[..max])?;
                if n == 0 {
                    return Err(unexpected_eof("chunk shorter than its length"));
                }
                let left = left - n as u64;
                *phase = if left == 0 {
                    ChunkPhase::DataEnd
                } else {
                    ChunkPhase::Data(left)
                };
                return Ok(n);
            }

            ChunkPhase::DataEnd => {
                if !read_line(src)?.is_empty() {
                    return Err(Error::ChunkExpectedCrLf);
                }
                *phase = ChunkPhase::Size;
            }

            // Trailer fields are discarded.
            ChunkPhase::Trailers => {
                if read_line(src)?.is_empty() {
                    *phase = ChunkPhase::Ended;
                }
            }

            ChunkPhase::Ended => return Ok(0),
        }
    }
}

/// Read a line without its line ending.
fn read_line(src: &mut impl BufRead) -> Result<Vec<u8>, Error> {
    let mut line = Vec::new();
    src.read_until(b'\n', &mut line)?;

    if line.pop() != Some(b'\n') {
        return Err(unexpected_eof("chunked body ended mid-line"));
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    Ok(line)
}

fn parse_chunk_len(line: &[u8]) -> Result<u64, Error> {
    let line = std::str::from_utf8(line).map_err(|_| Error::ChunkLenNotAscii)?;
    if !line.is_ascii() {
        return Err(Error::ChunkLenNotAscii);
    }

    // Chunk extensions are ignored.
    let len = line.split(';').next().unwrap_or_default().trim();

    u64::from_str_radix(len, 16).map_err(|_| Error::ChunkLenNotANumber)
}

fn unexpected_eof(msg: &'static str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, msg))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn read_all(reader: &mut BodyReader, mut input: &[u8]) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        // Small buffer to exercise partial reads.
        let mut buf = [0_u8; 3];
        loop {
            let n = reader.read(&mut input, &mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.append(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn mode_for_response() {
        let get = Method::GET;

        let mode = BodyReader::for_response(&get, StatusCode::OK, &headers(&[])).unwrap();
        assert_eq!(mode, BodyReader::CloseDelimited);

        let h = headers(&[("content-length", "12")]);
        let mode = BodyReader::for_response(&get, StatusCode::OK, &h).unwrap();
        assert_eq!(mode, BodyReader::LengthDelimited(12));

        let h = headers(&[("content-length", "12"), ("transfer-encoding", "gzip, chunked")]);
        let mode = BodyReader::for_response(&get, StatusCode::OK, &h).unwrap();
        assert_eq!(mode, BodyReader::Chunked(ChunkPhase::Size));

        let mode = BodyReader::for_response(&get, StatusCode::NO_CONTENT, &h).unwrap();
        assert_eq!(mode, BodyReader::NoBody);

        let mode = BodyReader::for_response(&Method::HEAD, StatusCode::OK, &h).unwrap();
        assert_eq!(mode, BodyReader::NoBody);
    }

    #[test]
    fn bad_content_length() {
        let h = headers(&[("content-length", "ten")]);
        let err = BodyReader::for_response(&Method::GET, StatusCode::OK, &h).unwrap_err();
        assert!(matches!(err, Error::BadContentLengthHeader));
    }

    #[test]
    fn has_content() {
        assert!(!BodyReader::NoBody.has_content());
        assert!(!BodyReader::LengthDelimited(0).has_content());
        assert!(BodyReader::LengthDelimited(1).has_content());
        assert!(BodyReader::CloseDelimited.has_content());
        assert!(BodyReader::Chunked(ChunkPhase::Size).has_content());
    }

    #[test]
    fn length_delimited() {
        let mut reader = BodyReader::LengthDelimited(5);
        let out = read_all(&mut reader, b"helloIGNORED").unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn length_delimited_short() {
        let mut reader = BodyReader::LengthDelimited(10);
        let err = read_all(&mut reader, b"hello").unwrap_err();
        let Error::Io(e) = err else {
            panic!("Expected Error::Io");
        };
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn close_delimited() {
        let mut reader = BodyReader::CloseDelimited;
        let out = read_all(&mut reader, b"until the end").unwrap();
        assert_eq!(out, b"until the end");
    }

    #[test]
    fn chunked() {
        let mut reader = BodyReader::Chunked(ChunkPhase::Size);
        let input = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nx-trailer: 1\r\n\r\nIGNORED";
        let out = read_all(&mut reader, input).unwrap();
        assert_eq!(out, b"hello world");
        assert_eq!(reader, BodyReader::Chunked(ChunkPhase::Ended));
    }

    #[test]
    fn chunk_len_not_ascii() {
        let mut reader = BodyReader::Chunked(ChunkPhase::Size);
        let err = read_all(&mut reader, b"\xFF\r\ndata\r\n").unwrap_err();
        assert!(matches!(err, Error::ChunkLenNotAscii));
    }

    #[test]
    fn chunk_len_not_a_number() {
        let mut reader = BodyReader::Chunked(ChunkPhase::Size);
        let err = read_all(&mut reader, b"xyz\r\ndata\r\n").unwrap_err();
        assert!(matches!(err, Error::ChunkLenNotANumber));
    }

    #[test]
    fn chunk_expected_crlf() {
        let mut reader = BodyReader::Chunked(ChunkPhase::Size);
        let err = read_all(&mut reader, b"2\r\nabcd\r\n0\r\n\r\n").unwrap_err();
        assert!(matches!(err, Error::ChunkExpectedCrLf));
    }

    #[test]
    fn chunked_truncated() {
        let mut reader = BodyReader::Chunked(ChunkPhase::Size);
        let err = read_all(&mut reader, b"5\r\nhel").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn request_body_buffers() {
        let mut body = RequestBody::default();
        assert!(body.is_empty());
        body.write_all(b"a=1").unwrap();
        body.write_all(b"&b=2").unwrap();
        assert_eq!(body.len(), 7);
        assert_eq!(body.as_bytes(), b"a=1&b=2");
    }
}
