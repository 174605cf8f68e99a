//! WebSocket HTTP upgrade handling.
//!
//! Implements both sides of the opening handshake per RFC 6455 Section 4.
//! The GUID is always supplied by the caller from [`HandshakeConfig`].
//!
//! [`HandshakeConfig`]: crate::config::HandshakeConfig

use crate::websocket::error::{HandshakeError, Rejection};
use base64::Engine;
use regex::Regex;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Resource paths accepted by the server: `/` or word segments joined by `/`.
static PATH_GRAMMAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/([A-Za-z0-9_]+(/[A-Za-z0-9_]+)*)?$").unwrap());

/// Header block terminator.
const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Return the length of the HTTP head in `buf`, terminator included.
pub fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| pos + HEAD_TERMINATOR.len())
}

/// HTTP headers keyed by lower-cased name.
///
/// Repeated headers are folded into one comma-separated value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, folding repeats.
    pub fn append(&mut self, name: &str, value: &str) {
        let value = value.trim();
        self.inner
            .entry(name.trim().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    /// Look up a header by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Number of distinct headers.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no headers are present.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn parse<'a>(lines: impl Iterator<Item = &'a str>) -> Option<Self> {
        let mut headers = Self::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':')?;
            headers.append(name, value);
        }
        Some(headers)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Parsed HTTP request line: `<method> <target> <version>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// Request method.
    pub method: String,
    /// Request target.
    pub target: String,
    /// Protocol token, e.g. `HTTP/1.1`.
    pub version: String,
}

impl RequestLine {
    /// Parse a request line.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::BadRequest`] unless the line has exactly three tokens.
    pub fn parse(line: &str) -> Result<Self, Rejection> {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(target), Some(version), None) => Ok(Self {
                method: method.to_string(),
                target: target.to_string(),
                version: version.to_string(),
            }),
            _ => Err(Rejection::BadRequest(format!("invalid request line: {line}"))),
        }
    }
}

/// An HTTP request head received by the server.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Request line.
    pub request_line: RequestLine,
    /// Request headers.
    pub headers: Headers,
}

impl UpgradeRequest {
    /// Parse an HTTP request head (up to and including the blank line).
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::BadRequest`] if the head is not UTF-8 or malformed.
    pub fn parse(head: &[u8]) -> Result<Self, Rejection> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Rejection::BadRequest("request head is not UTF-8".to_string()))?;

        let mut lines = text.split("\r\n");
        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| Rejection::BadRequest("empty request".to_string()))?;
        let request_line = RequestLine::parse(request_line)?;

        let headers = Headers::parse(lines)
            .ok_or_else(|| Rejection::BadRequest("malformed header line".to_string()))?;

        Ok(Self {
            request_line,
            headers,
        })
    }

    /// Run [`validate_upgrade_request`] on this request.
    ///
    /// # Errors
    ///
    /// See [`validate_upgrade_request`].
    pub fn validate(&self) -> Result<String, Rejection> {
        validate_upgrade_request(&self.request_line, &self.headers)
    }
}

/// Whether a header value is a comma-separated token list containing `token`.
fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Validate a client's upgrade request.
///
/// Checks run in order: method, path, protocol version, upgrade headers,
/// then `Host` and `Sec-WebSocket-Key` presence. On success the key is
/// returned exactly as sent.
///
/// `Connection` is read as a comma-separated token list and passes when any
/// token equals `upgrade` case-insensitively, so `keep-alive, Upgrade` is
/// accepted as well as a bare `Upgrade`.
///
/// # Errors
///
/// Returns the first [`Rejection`] encountered.
pub fn validate_upgrade_request(
    request_line: &RequestLine,
    headers: &Headers,
) -> Result<String, Rejection> {
    if request_line.method != "GET" {
        return Err(Rejection::MethodNotAllowed(request_line.method.clone()));
    }

    if !PATH_GRAMMAR.is_match(&request_line.target) {
        return Err(Rejection::Forbidden(request_line.target.clone()));
    }

    if request_line.version != "HTTP/1.1" {
        return Err(Rejection::BadRequest(format!(
            "unsupported protocol: {}",
            request_line.version
        )));
    }

    if !headers
        .get("upgrade")
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    {
        return Err(Rejection::BadRequest(
            "missing or invalid Upgrade header".to_string(),
        ));
    }

    if !headers
        .get("connection")
        .is_some_and(|v| has_token(v, "upgrade"))
    {
        return Err(Rejection::BadRequest(
            "missing or invalid Connection header".to_string(),
        ));
    }

    if headers.get("sec-websocket-version") != Some("13") {
        return Err(Rejection::BadRequest(
            "unsupported Sec-WebSocket-Version".to_string(),
        ));
    }

    if headers.get("host").is_none() {
        return Err(Rejection::BadRequest("missing Host header".to_string()));
    }

    headers
        .get("sec-websocket-key")
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Rejection::BadRequest("missing Sec-WebSocket-Key header".to_string()))
}

/// Compute `Sec-WebSocket-Accept` from a client key.
pub fn compute_accept_key(key: &str, guid: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(guid.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build the `101 Switching Protocols` response for a validated key.
pub fn build_accept_response(key: &str, guid: &str) -> Vec<u8> {
    let accept = compute_accept_key(key, guid);
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(nonce)
}

/// Build a client upgrade request.
///
/// Returns the request bytes and the key to verify the response against.
pub fn build_upgrade_request(host: &str, path: &str) -> (Vec<u8>, String) {
    let key = generate_key();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         \r\n"
    )
    .into_bytes();
    (request, key)
}

/// Parsed HTTP response head received by the client.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
}

impl ResponseHead {
    /// Parse an HTTP response head.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Malformed`] if the head cannot be parsed.
    pub fn parse(head: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(head)
            .map_err(|_| HandshakeError::Malformed("response head is not UTF-8".to_string()))?;

        let mut lines = text.split("\r\n");
        let status_line = lines.next().unwrap_or_default();
        let mut parts = status_line.splitn(3, ' ');
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/") => code
                .parse::<u16>()
                .map_err(|_| HandshakeError::Malformed(format!("bad status line: {status_line}")))?,
            _ => {
                return Err(HandshakeError::Malformed(format!(
                    "bad status line: {status_line}"
                )))
            },
        };

        let headers = Headers::parse(lines)
            .ok_or_else(|| HandshakeError::Malformed("malformed header line".to_string()))?;

        Ok(Self { status, headers })
    }
}

/// Verify the server's handshake response against the key we sent.
///
/// # Errors
///
/// Any mismatch is terminal; the connection must not exchange frames.
pub fn verify_accept_response(
    sent_key: &str,
    response: &[u8],
    guid: &str,
) -> Result<(), HandshakeError> {
    let head = ResponseHead::parse(response)?;
    if head.status != 101 {
        return Err(HandshakeError::UnexpectedStatus(head.status));
    }

    let upgrade = head
        .headers
        .get("upgrade")
        .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::InvalidHeader {
            name: "Upgrade",
            value: upgrade.to_string(),
        });
    }

    let connection = head
        .headers
        .get("connection")
        .ok_or(HandshakeError::MissingHeader("Connection"))?;
    if !has_token(connection, "upgrade") {
        return Err(HandshakeError::InvalidHeader {
            name: "Connection",
            value: connection.to_string(),
        });
    }

    let actual = head
        .headers
        .get("sec-websocket-accept")
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Accept"))?;
    let expected = compute_accept_key(sent_key, guid);
    if actual != expected {
        return Err(HandshakeError::AcceptMismatch {
            expected,
            actual: actual.to_string(),
        });
    }

    Ok(())
}

/// Reason phrase for the statuses this crate emits.
pub fn status_text(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        400 => "Bad Request",
        403 => "Forbidden",
        405 => "Method Not Allowed",
        426 => "Upgrade Required",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

/// Build an error response for failed upgrades.
pub fn error_response(status: u16, message: &str) -> Vec<u8> {
    let text = status_text(status);
    format!("HTTP/1.1 {status} {text}\r\n\r\n{message}\r\n").into_bytes()
}

/// Build the error response matching a rejection.
pub fn rejection_response(rejection: &Rejection) -> Vec<u8> {
    error_response(rejection.status_code(), &rejection.to_string())
}
