//! RESP2 wire codec: request encoding and reply decoding (spec.md §4.1).
//!
//! The value model is grounded on `lunatic-redis::types::Value` but
//! narrowed to the five cases spec.md's data model actually names —
//! `SimpleString`/`Error`/`Integer`/`BulkString`/`Array` — rather than the
//! teacher's six-case enum (which folds `Okay` and `Status` together).

use crate::error::{ErrorKind, RedisError, RedisResult};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A single RESP reply value.
///
/// `Error` is produced by the decoder only to let callers inspect it as
/// data inside a pipeline batch (spec.md §4.5); a bare top-level `decode`
/// never returns it — it is raised as a `RedisError` instead (§4.1: "raise
/// an ErrorReply ... never consumed as a value").
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<Value>>),
}

/// The `type` tag observable by callers (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::SimpleString(_) => ValueType::SimpleString,
            Value::Error(_) => ValueType::Error,
            Value::Integer(_) => ValueType::Integer,
            Value::BulkString(_) => ValueType::BulkString,
            Value::Array(_) => ValueType::Array,
        }
    }

    /// The raw bytes of a bulk reply, unchanged by any text decoding
    /// (spec.md §4.1: "bulk bytes must also be retrievable unchanged").
    pub fn buffer(&self) -> Option<&[u8]> {
        match self {
            Value::BulkString(Some(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::BulkString(None) | Value::Array(None))
    }
}

/// Encodes a command name and its arguments as one RESP request frame
/// (`*N\r\n` followed by N length-prefixed bulk strings) and appends it to
/// `out`. Multiple calls back-to-back produce a valid pipelined byte block
/// (spec.md §4.1).
pub fn encode_command<'a, I>(out: &mut Vec<u8>, name: &str, args: I)
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let args: Vec<&[u8]> = args.into_iter().collect();
    out.extend_from_slice(format!("*{}\r\n", args.len() + 1).as_bytes());
    encode_bulk(out, name.as_bytes());
    for arg in args {
        encode_bulk(out, arg);
    }
}

fn encode_bulk(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(b"\r\n");
}

/// Reads and parses exactly one RESP frame from a buffered reader.
///
/// Raises [`RedisError`] with kind `Eof` on an empty peek, `InvalidState`
/// on malformed framing, and a synthesized `Error` for a `-...` frame —
/// the last is surfaced to callers as data when used from the pipeline
/// executor via [`read_reply_or_value`].
pub async fn read_reply<R: AsyncBufRead + Unpin>(reader: &mut R) -> RedisResult<Value> {
    match read_value(reader).await? {
        Value::Error(msg) => Err(RedisError::from_error_line(&msg)),
        other => Ok(other),
    }
}

/// Like [`read_reply`], but returns a server error frame as `Ok(Value::Error(..))`
/// instead of raising it. Used by the pipeline executor, which embeds
/// per-command errors in its result list rather than aborting the batch
/// (spec.md §4.5).
pub async fn read_reply_or_value<R: AsyncBufRead + Unpin>(reader: &mut R) -> RedisResult<Value> {
    read_value(reader).await
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> RedisResult<String> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(RedisError::from_kind(ErrorKind::Eof));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

#[async_recursion::async_recursion]
async fn read_value<R: AsyncBufRead + Unpin + Send>(reader: &mut R) -> RedisResult<Value> {
    let mut tag = [0u8; 1];
    let n = reader.read(&mut tag).await?;
    if n == 0 {
        return Err(RedisError::from_kind(ErrorKind::Eof));
    }
    match tag[0] {
        b'+' => {
            let line = read_line(reader).await?;
            Ok(Value::SimpleString(line))
        }
        b'-' => {
            let line = read_line(reader).await?;
            Ok(Value::Error(line))
        }
        b':' => {
            let line = read_line(reader).await?;
            let n: i64 = line
                .parse()
                .map_err(|_| RedisError::new(ErrorKind::InvalidState, "invalid integer frame"))?;
            Ok(Value::Integer(n))
        }
        b'$' => {
            let line = read_line(reader).await?;
            let len: i64 = line
                .parse()
                .map_err(|_| RedisError::new(ErrorKind::InvalidState, "invalid bulk length"))?;
            if len < 0 {
                return Ok(Value::BulkString(None));
            }
            let len = len as usize;
            let mut buf = vec![0u8; len + 2];
            reader.read_exact(&mut buf).await?;
            buf.truncate(len);
            Ok(Value::BulkString(Some(buf)))
        }
        b'*' => {
            let line = read_line(reader).await?;
            let count: i64 = line
                .parse()
                .map_err(|_| RedisError::new(ErrorKind::InvalidState, "invalid array length"))?;
            if count < 0 {
                return Ok(Value::Array(None));
            }
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                items.push(read_value(reader).await?);
            }
            Ok(Value::Array(Some(items)))
        }
        other => Err(RedisError::new(
            ErrorKind::InvalidState,
            format!("unexpected reply tag byte {other:#x}"),
        )),
    }
}

/// Encodes an arbitrary reply [`Value`] back into RESP wire bytes. The
/// client side never needs this to talk to a real server (it only encodes
/// requests), but test doubles standing in for a server do.
pub fn encode_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::Error(s) => {
            out.push(b'-');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Value::BulkString(None) => out.extend_from_slice(b"$-1\r\n"),
        Value::BulkString(Some(bytes)) => encode_bulk(out, bytes),
        Value::Array(None) => out.extend_from_slice(b"*-1\r\n"),
        Value::Array(Some(items)) => {
            out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_value(out, item);
            }
        }
    }
}

/// Flushes a pre-encoded byte block to the writer.
pub async fn write_request<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> RedisResult<()> {
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn encodes_set_command() {
        let mut out = Vec::new();
        encode_command(&mut out, "SET", [b"name".as_slice(), b"bar".as_slice()]);
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$3\r\nbar\r\n".to_vec());
    }

    #[tokio::test]
    async fn round_trips_encoded_frame() {
        let mut out = Vec::new();
        encode_command(&mut out, "SET", [b"name".as_slice(), b"bar".as_slice()]);
        let mut cursor = Cursor::new(out);
        let value = read_reply(&mut cursor).await.unwrap();
        match value {
            Value::Array(Some(items)) => {
                let decoded: Vec<&[u8]> = items.iter().map(|v| v.buffer().unwrap()).collect();
                assert_eq!(decoded, vec![b"SET".as_slice(), b"name".as_slice(), b"bar".as_slice()]);
            }
            _ => panic!("expected array"),
        }
    }

    #[tokio::test]
    async fn decodes_simple_string() {
        let mut cursor = Cursor::new(b"+PONG\r\n".to_vec());
        assert_eq!(read_reply(&mut cursor).await.unwrap(), Value::SimpleString("PONG".into()));
    }

    #[tokio::test]
    async fn decodes_nil_bulk_string() {
        let mut cursor = Cursor::new(b"$-1\r\n".to_vec());
        assert_eq!(read_reply(&mut cursor).await.unwrap(), Value::BulkString(None));
    }

    #[tokio::test]
    async fn decodes_nil_array() {
        let mut cursor = Cursor::new(b"*-1\r\n".to_vec());
        assert_eq!(read_reply(&mut cursor).await.unwrap(), Value::Array(None));
    }

    #[tokio::test]
    async fn error_frame_is_raised_not_returned() {
        let mut cursor = Cursor::new(b"-ERR unknown command\r\n".to_vec());
        let err = read_reply(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ErrorReply);
    }

    #[tokio::test]
    async fn eof_on_empty_stream() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_reply(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Eof);
    }

    #[tokio::test]
    async fn invalid_tag_byte_fails() {
        let mut cursor = Cursor::new(b"!nope\r\n".to_vec());
        let err = read_reply(&mut cursor).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
