// src/core/protocol/resp_frame.rs

//! Implements the RESP (REdis Serialization Protocol) frame structure and the
//! corresponding `Encoder` and `Decoder` used by the client to talk to the store.

use crate::core::DatasourceError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Limits applied to server replies so a misbehaving peer cannot exhaust memory.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 256;

/// A single frame in the RESP protocol, as sent to or received from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds a command frame (an array of bulk strings) from its arguments.
    pub fn command<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Bytes>,
    {
        RespFrame::Array(
            args.into_iter()
                .map(|arg| RespFrame::BulkString(arg.into()))
                .collect(),
        )
    }

    /// Returns the textual payload of a simple or bulk string frame.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespFrame::SimpleString(s) => Some(s),
            RespFrame::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = DatasourceError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => {
                dst.extend_from_slice(b"$-1\r\n");
            }
            RespFrame::NullArray => {
                dst.extend_from_slice(b"*-1\r\n");
            }
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = DatasourceError;

    /// Decodes one `RespFrame` from the buffer, leaving it untouched until a
    /// complete frame is available.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut bytes = &src[..];
        match self.decode_recursive(&mut bytes, 0) {
            Ok(frame) => {
                let len = src.len() - bytes.len();
                src.advance(len);
                Ok(Some(frame))
            }
            Err(DatasourceError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl RespFrameCodec {
    fn decode_recursive(
        &self,
        bytes: &mut &[u8],
        depth: usize,
    ) -> Result<RespFrame, DatasourceError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(DatasourceError::Protocol(
                "RESP recursion depth limit exceeded".to_string(),
            ));
        }

        if bytes.is_empty() {
            return Err(DatasourceError::IncompleteData);
        }

        match bytes[0] {
            b'+' => self.parse_simple_string(bytes),
            b'-' => self.parse_error(bytes),
            b':' => self.parse_integer(bytes),
            b'$' => self.parse_bulk_string(bytes),
            b'*' => self.parse_array(bytes, depth),
            other => Err(DatasourceError::Protocol(format!(
                "unexpected frame prefix byte 0x{other:02x}"
            ))),
        }
    }

    /// Returns the next CRLF-terminated line and advances past it.
    fn parse_line<'a>(&self, bytes: &mut &'a [u8]) -> Result<&'a [u8], DatasourceError> {
        if let Some(pos) = find_crlf(bytes) {
            let line = &bytes[..pos];
            *bytes = &bytes[pos + CRLF_LEN..];
            Ok(line)
        } else {
            Err(DatasourceError::IncompleteData)
        }
    }

    /// Parses a length header such as the `5` in `$5\r\n`.
    fn parse_length(&self, bytes: &mut &[u8]) -> Result<isize, DatasourceError> {
        let line = self.parse_line(bytes)?;
        let s = String::from_utf8_lossy(line);
        s.parse::<isize>()
            .map_err(|_| DatasourceError::Protocol(format!("invalid length header '{s}'")))
    }

    fn parse_simple_string(&self, bytes: &mut &[u8]) -> Result<RespFrame, DatasourceError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        Ok(RespFrame::SimpleString(
            String::from_utf8_lossy(line).to_string(),
        ))
    }

    fn parse_error(&self, bytes: &mut &[u8]) -> Result<RespFrame, DatasourceError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        Ok(RespFrame::Error(String::from_utf8_lossy(line).to_string()))
    }

    fn parse_integer(&self, bytes: &mut &[u8]) -> Result<RespFrame, DatasourceError> {
        *bytes = &bytes[1..];
        let line = self.parse_line(bytes)?;
        let s = String::from_utf8_lossy(line);
        let i = s
            .parse::<i64>()
            .map_err(|_| DatasourceError::Protocol(format!("invalid integer '{s}'")))?;
        Ok(RespFrame::Integer(i))
    }

    /// Parses a Bulk String (e.g., `$5\r\nhello\r\n`).
    fn parse_bulk_string(&self, bytes: &mut &[u8]) -> Result<RespFrame, DatasourceError> {
        *bytes = &bytes[1..];
        let str_len = self.parse_length(bytes)?;

        if str_len == -1 {
            return Ok(RespFrame::Null);
        }
        if str_len < 0 {
            return Err(DatasourceError::Protocol(format!(
                "negative bulk string length {str_len}"
            )));
        }

        let str_len = str_len as usize;
        if str_len > MAX_BULK_STRING_SIZE {
            return Err(DatasourceError::Protocol(format!(
                "bulk string of {str_len} bytes exceeds limit"
            )));
        }

        if bytes.len() < str_len + CRLF_LEN {
            return Err(DatasourceError::IncompleteData);
        }

        if &bytes[str_len..str_len + CRLF_LEN] != CRLF {
            return Err(DatasourceError::Protocol(
                "bulk string is not CRLF terminated".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&bytes[..str_len]);
        *bytes = &bytes[str_len + CRLF_LEN..];
        Ok(RespFrame::BulkString(data))
    }

    /// Parses an Array (e.g., `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`).
    fn parse_array(&self, bytes: &mut &[u8], depth: usize) -> Result<RespFrame, DatasourceError> {
        *bytes = &bytes[1..];
        let arr_len = self.parse_length(bytes)?;

        if arr_len == -1 {
            return Ok(RespFrame::NullArray);
        }
        if arr_len < 0 {
            return Err(DatasourceError::Protocol(format!(
                "negative array length {arr_len}"
            )));
        }

        let arr_len = arr_len as usize;
        if arr_len > MAX_FRAME_ELEMENTS {
            return Err(DatasourceError::Protocol(format!(
                "array of {arr_len} elements exceeds limit"
            )));
        }

        let mut frames = Vec::with_capacity(arr_len.min(1024));
        for _ in 0..arr_len {
            frames.push(self.decode_recursive(bytes, depth + 1)?);
        }
        Ok(RespFrame::Array(frames))
    }
}

fn find_crlf(src: &[u8]) -> Option<usize> {
    src.windows(CRLF_LEN).position(|window| window == CRLF)
}
