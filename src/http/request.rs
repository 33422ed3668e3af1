use std::collections::HashMap;
use std::io::BufRead;

use super::error::HttpError;

/// A parsed HTTP/1.1 request: the "HTTP collaborator" input of `spec.md`
/// §6, made concrete (`SPEC_FULL.md` §4.E). Grounded on
/// `gosocks/http/request.go`.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub path: String,
  pub protocol: String,
  pub headers: HashMap<String, String>,
  pub body: Vec<u8>,
}

impl Request {
  /// Header lookup is case-sensitive, matching the plain `map[string]string`
  /// lookups in `gosocks/http/handshake.go`.
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).map(String::as_str)
  }

  /// Parses the request line and headers from `reader`. Only
  /// `HTTP/1.1` is accepted. No request body is read — the WebSocket
  /// handshake request never carries one, and a general body reader is out
  /// of this crate's scope (`SPEC_FULL.md` Non-goals).
  pub fn parse<R: BufRead>(reader: &mut R) -> Result<Request, HttpError> {
    let method = read_token(reader, b' ')?;
    if method.is_empty() {
      return Err(HttpError::bad_request("empty request method"));
    }

    let path = read_token(reader, b' ')?;
    let protocol = read_token(reader, b'\n')?;
    if protocol != "HTTP/1.1" {
      return Err(HttpError::bad_request(format!(
        "unsupported protocol: {protocol}"
      )));
    }

    let headers = parse_headers(reader)?;

    Ok(Request {
      method,
      path,
      protocol,
      headers,
      body: Vec::new(),
    })
  }
}

fn read_token<R: BufRead>(reader: &mut R, until: u8) -> Result<String, HttpError> {
  let mut buf = Vec::new();
  reader
    .read_until(until, &mut buf)
    .map_err(|err| HttpError::bad_request(format!("failed to read request: {err}")))?;
  if buf.last() == Some(&until) {
    buf.pop();
  }
  Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

fn parse_headers<R: BufRead>(
  reader: &mut R,
) -> Result<HashMap<String, String>, HttpError> {
  let mut headers = HashMap::new();

  loop {
    let mut line = Vec::new();
    reader
      .read_until(b'\n', &mut line)
      .map_err(|err| HttpError::bad_request(format!("failed to read headers: {err}")))?;

    if line.last() == Some(&b'\n') {
      line.pop();
      if line.last() == Some(&b'\r') {
        line.pop();
      }
    }

    if line.is_empty() {
      return Ok(headers);
    }

    let line = String::from_utf8_lossy(&line);
    let (name, value) = line
      .split_once(':')
      .ok_or_else(|| HttpError::bad_request(format!("malformed header line: {line}")))?;
    headers.insert(name.trim().to_string(), value.trim().to_string());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  #[test]
  fn parses_request_line_and_headers() {
    let raw = "GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
    let mut cursor = Cursor::new(raw.as_bytes());
    let request = Request::parse(&mut cursor).expect("parse");
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/chat");
    assert_eq!(request.protocol, "HTTP/1.1");
    assert_eq!(request.header("Upgrade"), Some("websocket"));
    assert_eq!(request.header("Connection"), Some("Upgrade"));
  }

  #[test]
  fn rejects_unsupported_protocol() {
    let raw = "GET / HTTP/1.0\r\n\r\n";
    let mut cursor = Cursor::new(raw.as_bytes());
    assert!(Request::parse(&mut cursor).is_err());
  }

  #[test]
  fn rejects_malformed_header_line() {
    let raw = "GET / HTTP/1.1\r\nnotaheader\r\n\r\n";
    let mut cursor = Cursor::new(raw.as_bytes());
    assert!(Request::parse(&mut cursor).is_err());
  }
}
