//! HTTP/1.x response dump and parse.
//!
//! Entries are stored as the raw bytes a client would receive: status line,
//! header lines, a blank line, then the body. Chunked bodies are re-chunked on
//! encode so the stored headers stay exactly as received.

use bytes::{BufMut, Bytes, BytesMut};
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, StatusCode};

/// Errors from parsing a serialized response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("missing status line")]
    MissingStatusLine,

    #[error("malformed status line: {0}")]
    MalformedStatusLine(String),

    #[error("malformed header line: {0}")]
    MalformedHeader(String),

    #[error("header section not terminated")]
    UnterminatedHead,

    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    #[error("body truncated: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },

    #[error("{0} unexpected bytes after body")]
    TrailingBytes(usize),

    #[error("malformed chunked body: {0}")]
    MalformedChunk(String),
}

/// One header line, kept with its original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

impl HeaderLine {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    fn is(&self, lower_name: &str) -> bool {
        self.name.eq_ignore_ascii_case(lower_name)
    }
}

/// A complete HTTP response as stored on disk.
///
/// Header order and duplicates are preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// Protocol token of the status line, e.g. `HTTP/1.1`.
    pub version: String,
    pub status: StatusCode,
    /// Reason phrase as received; may be empty.
    pub reason: String,
    pub headers: Vec<HeaderLine>,
    pub body: Bytes,
}

impl CachedResponse {
    /// An `HTTP/1.1` response with the canonical reason phrase and no headers or body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: "HTTP/1.1".to_string(),
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(HeaderLine::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|h| h.is(name)).map(|h| h.value.as_str())
    }

    /// Headers as an `http::HeaderMap`. Lines that are not valid header values are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for line in &self.headers {
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_bytes(line.name.as_bytes()), HeaderValue::from_str(&line.value))
            {
                map.append(name, value);
            }
        }
        map
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn status_line(&self) -> String {
        if self.reason.is_empty() {
            format!("{} {}", self.version, self.status.as_u16())
        } else {
            format!("{} {} {}", self.version, self.status.as_u16(), self.reason)
        }
    }

    fn is_chunked(&self) -> bool {
        self.headers
            .iter()
            .filter(|h| h.is("transfer-encoding"))
            .flat_map(|h| h.value.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Serialize to the on-disk wire format.
    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(256 + self.body.len());
        buffer.put_slice(self.status_line().as_bytes());
        buffer.put_slice(b"\r\n");

        let chunked = self.is_chunked();
        let body_len = self.body.len().to_string();
        for header in &self.headers {
            let value = if !chunked && header.is("content-length") && !self.body.is_empty() {
                body_len.as_str()
            } else {
                header.value.as_str()
            };
            buffer.put_slice(header.name.as_bytes());
            buffer.put_slice(b": ");
            buffer.put_slice(value.as_bytes());
            buffer.put_slice(b"\r\n");
        }
        buffer.put_slice(b"\r\n");

        if chunked {
            if !self.body.is_empty() {
                buffer.put_slice(format!("{:x}\r\n", self.body.len()).as_bytes());
                buffer.put_slice(&self.body);
                buffer.put_slice(b"\r\n");
            }
            buffer.put_slice(b"0\r\n\r\n");
        } else {
            buffer.put_slice(&self.body);
        }

        buffer.freeze()
    }

    /// Parse a response previously produced by [`CachedResponse::encode`] or any HTTP/1.x dump.
    pub fn parse(input: &[u8]) -> Result<Self, WireError> {
        let mut cursor = Cursor { input, pos: 0 };

        let status_line = cursor.line().ok_or(WireError::MissingStatusLine)?;
        let (version, status, reason) = parse_status_line(status_line)?;

        let mut headers = Vec::new();
        loop {
            let line = cursor.line().ok_or(WireError::UnterminatedHead)?;
            if line.is_empty() {
                break;
            }
            headers.push(parse_header_line(line)?);
        }

        let mut response = Self { version, status, reason, headers, body: Bytes::new() };
        let rest = cursor.rest();

        let body = if response.is_chunked() {
            decode_chunked(rest)?
        } else if let Some(raw) = response.header("content-length") {
            let expected: usize =
                raw.trim().parse().map_err(|_| WireError::InvalidContentLength(raw.to_string()))?;
            match rest.len() {
                0 => Bytes::new(),
                found if found < expected => return Err(WireError::Truncated { expected, found }),
                found if found > expected => return Err(WireError::TrailingBytes(found - expected)),
                _ => Bytes::copy_from_slice(rest),
            }
        } else {
            Bytes::copy_from_slice(rest)
        };
        response.body = body;

        Ok(response)
    }
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Next line without its terminator. Accepts CRLF and bare LF.
    fn line(&mut self) -> Option<&'a [u8]> {
        let input = self.input;
        let rest = &input[self.pos..];
        let end = rest.iter().position(|&b| b == b'\n')?;
        self.pos += end + 1;
        let line = &rest[..end];
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let input = self.input;
        let rest = &input[self.pos..];
        if rest.len() < n {
            return None;
        }
        self.pos += n;
        Some(&rest[..n])
    }

    fn rest(&self) -> &'a [u8] {
        let input = self.input;
        &input[self.pos..]
    }
}

fn parse_status_line(line: &[u8]) -> Result<(String, StatusCode, String), WireError> {
    let malformed = || WireError::MalformedStatusLine(String::from_utf8_lossy(line).into_owned());
    let line = std::str::from_utf8(line).map_err(|_| malformed())?;

    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let code = parts.next().ok_or_else(malformed)?;
    let reason = parts.next().unwrap_or_default();

    if !version.starts_with("HTTP/") {
        return Err(malformed());
    }
    if code.len() != 3 {
        return Err(malformed());
    }
    let status = StatusCode::from_bytes(code.as_bytes()).map_err(|_| malformed())?;

    Ok((version.to_string(), status, reason.to_string()))
}

fn parse_header_line(line: &[u8]) -> Result<HeaderLine, WireError> {
    let malformed = || WireError::MalformedHeader(String::from_utf8_lossy(line).into_owned());
    let line = std::str::from_utf8(line).map_err(|_| malformed())?;

    let (name, value) = line.split_once(':').ok_or_else(malformed)?;
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| malformed())?;

    Ok(HeaderLine::new(name, value.trim_matches([' ', '\t'])))
}

fn decode_chunked(input: &[u8]) -> Result<Bytes, WireError> {
    let mut cursor = Cursor { input, pos: 0 };
    let mut body = BytesMut::new();

    loop {
        let size_line = cursor
            .line()
            .ok_or_else(|| WireError::MalformedChunk("missing chunk size".to_string()))?;
        let size_line = std::str::from_utf8(size_line)
            .map_err(|_| WireError::MalformedChunk("chunk size is not ascii".to_string()))?;
        let size_token = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_token, 16)
            .map_err(|_| WireError::MalformedChunk(format!("invalid chunk size '{size_token}'")))?;

        if size == 0 {
            // Trailer section: zero or more header lines, then an empty line.
            loop {
                let line = cursor
                    .line()
                    .ok_or_else(|| WireError::MalformedChunk("unterminated trailer".to_string()))?;
                if line.is_empty() {
                    break;
                }
            }
            break;
        }

        let data = cursor
            .take(size)
            .ok_or_else(|| WireError::Truncated { expected: size, found: cursor.rest().len() })?;
        body.put_slice(data);

        match cursor.line() {
            Some(b"") => {}
            _ => return Err(WireError::MalformedChunk("missing CRLF after chunk data".to_string())),
        }
    }

    if !cursor.rest().is_empty() {
        return Err(WireError::TrailingBytes(cursor.rest().len()));
    }

    Ok(body.freeze())
}
