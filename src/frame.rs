use std::io::Read;

use crate::error::WebSocketError;
use crate::mask;

/// A WebSocket frame opcode (`spec.md` §3). Decode does not reject unknown
/// 4-bit values — classification of "other" opcodes is the connection state
/// machine's job (`spec.md` §4.C), not the codec's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCode(pub u8);

impl OpCode {
  pub const CONTINUATION: OpCode = OpCode(0x0);
  pub const TEXT: OpCode = OpCode(0x1);
  pub const BINARY: OpCode = OpCode(0x2);
  pub const CLOSE: OpCode = OpCode(0x8);
  pub const PING: OpCode = OpCode(0x9);
  pub const PONG: OpCode = OpCode(0xA);

  /// Control frames (`opcode >= 0x8`) are always unfragmented and carry at
  /// most 125 octets of payload.
  pub fn is_control(&self) -> bool {
    self.0 >= 0x8
  }
}

/// A decoded or to-be-encoded WebSocket frame. After `decode`, `payload`
/// always holds unmasked bytes, regardless of the `masked` flag (`spec.md`
/// §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
  pub fin: bool,
  pub opcode: OpCode,
  pub masked: bool,
  pub masking_key: Option<[u8; 4]>,
  pub payload: Vec<u8>,
}

const MAX_CONTROL_PAYLOAD: usize = 125;

impl Frame {
  fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
    Frame {
      fin,
      opcode,
      masked: false,
      masking_key: None,
      payload,
    }
  }

  pub fn text(payload: Vec<u8>) -> Self {
    Frame::new(true, OpCode::TEXT, payload)
  }

  pub fn binary(payload: Vec<u8>) -> Self {
    Frame::new(true, OpCode::BINARY, payload)
  }

  pub fn ping(mut payload: Vec<u8>) -> Self {
    payload.truncate(MAX_CONTROL_PAYLOAD);
    Frame::new(true, OpCode::PING, payload)
  }

  pub fn pong(mut payload: Vec<u8>) -> Self {
    payload.truncate(MAX_CONTROL_PAYLOAD);
    Frame::new(true, OpCode::PONG, payload)
  }

  /// Composes a close frame payload as `big-endian(code) || reason`,
  /// truncated to 125 octets total (`spec.md` §4.A).
  pub fn close(code: u16, reason: &str) -> Self {
    let mut payload = Vec::with_capacity(2 + reason.len());
    payload.extend_from_slice(&code.to_be_bytes());
    payload.extend_from_slice(reason.as_bytes());
    payload.truncate(MAX_CONTROL_PAYLOAD);
    Frame::new(true, OpCode::CLOSE, payload)
  }

  /// Decodes exactly one frame from `reader`. Unmasks the payload in place
  /// if `masked` is set. Short reads surface as `IncompleteFrame`; a
  /// 64-bit length that does not fit in this platform's `usize` surfaces as
  /// `MalformedFrame` (`spec.md` §4.A).
  pub fn decode<R: Read>(reader: &mut R) -> Result<Frame, WebSocketError> {
    let mut head = [0u8; 2];
    read_exact(reader, &mut head)?;

    let fin = head[0] & 0b1000_0000 != 0;
    let opcode = OpCode(head[0] & 0b0000_1111);

    let masked = head[1] & 0b1000_0000 != 0;
    let len_field = head[1] & 0b0111_1111;

    let payload_length: u64 = match len_field {
      0..=125 => len_field as u64,
      126 => {
        let mut buf = [0u8; 2];
        read_exact(reader, &mut buf)?;
        u16::from_be_bytes(buf) as u64
      }
      127 => {
        let mut buf = [0u8; 8];
        read_exact(reader, &mut buf)?;
        u64::from_be_bytes(buf)
      }
      _ => unreachable!("7-bit field"),
    };

    let payload_length = usize::try_from(payload_length).map_err(|_| {
      WebSocketError::MalformedFrame(format!(
        "payload length {payload_length} does not fit in usize"
      ))
    })?;

    let masking_key = if masked {
      let mut key = [0u8; 4];
      read_exact(reader, &mut key)?;
      Some(key)
    } else {
      None
    };

    let mut payload = vec![0u8; payload_length];
    read_exact(reader, &mut payload)?;

    if let Some(key) = masking_key {
      mask::unmask(&mut payload, key);
    }

    Ok(Frame {
      fin,
      opcode,
      masked,
      masking_key,
      payload,
    })
  }

  /// Serializes this frame, choosing the shortest valid length encoding.
  /// Server-produced frames are always emitted unmasked, per `spec.md`
  /// §4.A — this method ignores `self.masked`/`self.masking_key` and never
  /// writes a masking-key field.
  pub fn encode(&self) -> Vec<u8> {
    let len = self.payload.len();
    let mut out = Vec::with_capacity(2 + 8 + len);

    let first = (self.fin as u8) << 7 | self.opcode.0;
    out.push(first);

    if len <= 125 {
      out.push(len as u8);
    } else if len <= 0xFFFF {
      out.push(126);
      out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
      out.push(127);
      out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(&self.payload);
    out
  }
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), WebSocketError> {
  reader.read_exact(buf).map_err(WebSocketError::IncompleteFrame)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn roundtrip(frame: &Frame) -> Frame {
    let encoded = frame.encode();
    Frame::decode(&mut &encoded[..]).expect("decode")
  }

  #[test]
  fn unmasked_roundtrip() {
    let frame = Frame::text(b"Hello".to_vec());
    assert_eq!(roundtrip(&frame), frame);
  }

  #[test]
  fn boundary_lengths_choose_shortest_encoding() {
    for len in [0usize, 1, 125, 126, 127, 65535, 65536] {
      let frame = Frame::binary(vec![0xAB; len]);
      let encoded = frame.encode();
      match len {
        0..=125 => {
          assert_eq!(encoded[1], len as u8);
          assert_eq!(encoded.len(), 2 + len);
        }
        126..=65535 => {
          assert_eq!(encoded[1], 126);
          assert_eq!(encoded.len(), 2 + 2 + len);
        }
        _ => {
          assert_eq!(encoded[1], 127);
          assert_eq!(encoded.len(), 2 + 8 + len);
        }
      }
      let decoded = Frame::decode(&mut &encoded[..]).expect("decode");
      assert_eq!(decoded.payload.len(), len);
    }
  }

  #[test]
  fn control_frame_constructors_truncate_to_125() {
    let ping = Frame::ping(vec![0u8; 200]);
    assert_eq!(ping.payload.len(), 125);
    let pong = Frame::pong(vec![0u8; 200]);
    assert_eq!(pong.payload.len(), 125);
    let close = Frame::close(1000, &"x".repeat(200));
    assert_eq!(close.payload.len(), 125);
  }

  #[test]
  fn decode_client_masked_text_frame() {
    // fin=1, opcode=1, masked=1, len=5, key=0x37fa213d, payload="Hello" masked
    let key = [0x37, 0xfa, 0x21, 0x3d];
    let plaintext = b"Hello";
    let mut masked_payload = plaintext.to_vec();
    mask::unmask(&mut masked_payload, key);

    let mut wire = vec![0x81, 0x85];
    wire.extend_from_slice(&key);
    wire.extend_from_slice(&masked_payload);

    let frame = Frame::decode(&mut &wire[..]).expect("decode");
    assert!(frame.fin);
    assert_eq!(frame.opcode, OpCode::TEXT);
    assert!(frame.masked);
    assert_eq!(frame.payload, plaintext);
  }

  #[test]
  fn short_read_is_incomplete_frame() {
    let wire = [0x81u8];
    let err = Frame::decode(&mut &wire[..]).unwrap_err();
    assert!(matches!(err, WebSocketError::IncompleteFrame(_)));
  }
}
