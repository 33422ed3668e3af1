use std::io::{self, Write};

/// An HTTP/1.1 response: the "HTTP collaborator" output of `spec.md` §6,
/// made concrete (`SPEC_FULL.md` §4.E). Grounded on
/// `gosocks/http/response.go`.
///
/// Headers are kept in insertion order (a `Vec`, not a map) so that
/// serialization is deterministic — useful for the fixed-header `101`
/// responses the handshake produces.
#[derive(Debug, Clone)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

fn reason_phrase(status: u16) -> &'static str {
  match status {
    101 => "Switching Protocols",
    400 => "Bad Request",
    404 => "Not Found",
    500 => "Internal Server Error",
    200 => "OK",
    _ => "Unknown",
  }
}

impl Response {
  pub fn new(status: u16) -> Self {
    Response {
      status,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  pub fn with_body(status: u16, body: Vec<u8>) -> Self {
    let mut response = Response::new(status);
    response.body = body;
    response
  }

  pub fn set_header(&mut self, name: &str, value: &str) {
    self.headers.push((name.to_string(), value.to_string()));
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Serializes `HTTP/1.1 <code> <reason>\r\n` + headers + `Content-Length`
  /// + `\r\n` + body, exactly as `spec.md` §6 specifies.
  pub fn write<W: Write>(&self, writer: &mut W) -> io::Result<()> {
    write!(
      writer,
      "HTTP/1.1 {} {}\r\n",
      self.status,
      reason_phrase(self.status)
    )?;

    for (name, value) in &self.headers {
      write!(writer, "{name}: {value}\r\n")?;
    }
    write!(writer, "Content-Length: {}\r\n", self.body.len())?;
    write!(writer, "\r\n")?;
    writer.write_all(&self.body)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn serializes_status_line_headers_and_body() {
    let mut response = Response::new(101);
    response.set_header("Upgrade", "websocket");
    response.set_header("Connection", "upgrade");
    response.set_header("Sec-WebSocket-Accept", "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");

    let mut out = Vec::new();
    response.write(&mut out).expect("write");
    let text = String::from_utf8(out).expect("utf8");

    assert!(text.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(text.contains("Upgrade: websocket\r\n"));
    assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    assert!(text.contains("Content-Length: 0\r\n"));
    assert!(text.ends_with("\r\n\r\n"));
  }
}
