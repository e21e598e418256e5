//! Minimal RESP2 client for the in-memory brokers.
//!
//! # Responsibilities
//! - Encode commands as arrays of bulk strings
//! - Decode replies (simple, error, integer, bulk, flat array)
//! - Bound every connect and round trip with a timeout
//!
//! # Design Decisions
//! - One short-lived connection per operation; the controller is a run-to-completion CLI
//! - Nested arrays are rejected; none of the commands we send produce them
//! - Declared lengths are capped before anything is allocated for them

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::queue::QueueError;

/// Largest bulk string a broker may send (the server's own proto-max-bulk-len).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Largest array reply accepted.
pub const MAX_ARRAY_LEN: i64 = 1024 * 1024;

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Bulk strings of an array reply, lossily decoded.
    pub fn into_strings(self) -> Result<Vec<String>, QueueError> {
        match self {
            RespValue::Array(None) => Ok(Vec::new()),
            RespValue::Array(Some(items)) => items
                .into_iter()
                .map(|item| match item {
                    RespValue::Bulk(Some(bytes)) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
                    RespValue::Simple(s) => Ok(s),
                    other => Err(QueueError::Protocol(format!("expected string, got {other:?}"))),
                })
                .collect(),
            RespValue::Error(msg) => Err(QueueError::Server(msg)),
            other => Err(QueueError::Protocol(format!("expected array, got {other:?}"))),
        }
    }

    pub fn into_integer(self) -> Result<i64, QueueError> {
        match self {
            RespValue::Integer(n) => Ok(n),
            RespValue::Error(msg) => Err(QueueError::Server(msg)),
            other => Err(QueueError::Protocol(format!("expected integer, got {other:?}"))),
        }
    }
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&str]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, QueueError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(QueueError::Protocol("connection closed mid-reply".into()));
    }
    if !line.ends_with("\r\n") {
        return Err(QueueError::Protocol(format!("unterminated line {line:?}")));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_len(text: &str) -> Result<i64, QueueError> {
    text.parse()
        .map_err(|_| QueueError::Protocol(format!("bad length {text:?}")))
}

fn check_len(len: i64, max: i64, what: &str) -> Result<usize, QueueError> {
    if len > max {
        return Err(QueueError::Protocol(format!("{what} length {len} exceeds {max}")));
    }
    usize::try_from(len).map_err(|_| QueueError::Protocol(format!("bad {what} length {len}")))
}

async fn read_scalar<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    line: &str,
) -> Result<RespValue, QueueError> {
    let mut chars = line.chars();
    let kind = chars.next();
    let rest = chars.as_str();
    match kind {
        Some('+') => Ok(RespValue::Simple(rest.to_string())),
        Some('-') => Ok(RespValue::Error(rest.to_string())),
        Some(':') => Ok(RespValue::Integer(parse_len(rest)?)),
        Some('$') => {
            let len = parse_len(rest)?;
            if len < 0 {
                return Ok(RespValue::Bulk(None));
            }
            let len = check_len(len, MAX_BULK_LEN, "bulk")?;
            let mut buf = Vec::new();
            let read = (&mut *reader).take(len as u64 + 2).read_to_end(&mut buf).await?;
            if read != len + 2 || !buf.ends_with(b"\r\n") {
                return Err(QueueError::Protocol("bulk string missing terminator".into()));
            }
            buf.truncate(len);
            Ok(RespValue::Bulk(Some(buf)))
        }
        _ => Err(QueueError::Protocol(format!("unexpected reply {line:?}"))),
    }
}

/// Read one reply.
pub async fn read_value<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<RespValue, QueueError> {
    let line = read_line(reader).await?;
    let Some(count) = line.strip_prefix('*') else {
        return read_scalar(reader, &line).await;
    };

    let count = parse_len(count)?;
    if count < 0 {
        return Ok(RespValue::Array(None));
    }
    let count = check_len(count, MAX_ARRAY_LEN, "array")?;
    let mut items = Vec::new();
    for _ in 0..count {
        let item_line = read_line(reader).await?;
        if item_line.starts_with('*') {
            return Err(QueueError::Protocol("nested arrays are not supported".into()));
        }
        items.push(read_scalar(reader, &item_line).await?);
    }
    Ok(RespValue::Array(Some(items)))
}

/// One connection to a broker.
pub struct RespConnection {
    endpoint: String,
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

impl RespConnection {
    pub async fn connect(endpoint: &str, limit: Duration) -> Result<Self, QueueError> {
        let stream = match timeout(limit, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(QueueError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                })
            }
            Err(_) => return Err(QueueError::Timeout(endpoint.to_string())),
        };
        Ok(Self {
            endpoint: endpoint.to_string(),
            stream: BufReader::new(stream),
            timeout: limit,
        })
    }

    /// Send one command and read its reply.
    pub async fn command(&mut self, args: &[&str]) -> Result<RespValue, QueueError> {
        let request = encode_command(args);
        let limit = self.timeout;
        let stream = &mut self.stream;
        let round_trip = async move {
            stream.get_mut().write_all(&request).await?;
            read_value(stream).await
        };
        match timeout(limit, round_trip).await {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout(self.endpoint.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command() {
        assert_eq!(
            encode_command(&["ZRANGE", "rq:failed:message", "0", "-1"]),
            b"*4\r\n$6\r\nZRANGE\r\n$17\r\nrq:failed:message\r\n$1\r\n0\r\n$2\r\n-1\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_read_replies() {
        let mut input: &[u8] = b"+PONG\r\n:3\r\n$-1\r\n-ERR wrong type\r\n";
        assert_eq!(read_value(&mut input).await.unwrap(), RespValue::Simple("PONG".into()));
        assert_eq!(read_value(&mut input).await.unwrap(), RespValue::Integer(3));
        assert_eq!(read_value(&mut input).await.unwrap(), RespValue::Bulk(None));
        assert_eq!(
            read_value(&mut input).await.unwrap(),
            RespValue::Error("ERR wrong type".into())
        );
    }

    #[tokio::test]
    async fn test_read_array_of_ids() {
        let mut input: &[u8] = b"*2\r\n$4\r\njob1\r\n$4\r\njob2\r\n*0\r\n";
        let ids = read_value(&mut input).await.unwrap().into_strings().unwrap();
        assert_eq!(ids, vec!["job1", "job2"]);
        let empty = read_value(&mut input).await.unwrap().into_strings().unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_reply_is_protocol_error() {
        let mut input: &[u8] = b"$10\r\nshort";
        assert!(read_value(&mut input).await.is_err());

        let mut input: &[u8] = b"*1\r\n*0\r\n";
        assert!(matches!(
            read_value(&mut input).await,
            Err(QueueError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_oversized_headers_rejected() {
        for header in [
            &b"*9223372036854775807\r\n"[..],
            b"*4611686018427387904\r\n",
            b"$9223372036854775807\r\n",
            b"$536870913\r\n",
            b"*1\r\n$9223372036854775807\r\n",
        ] {
            let mut input = header;
            assert!(
                matches!(read_value(&mut input).await, Err(QueueError::Protocol(_))),
                "{}",
                String::from_utf8_lossy(header)
            );
        }
    }

    #[tokio::test]
    async fn test_bulk_shorter_than_declared() {
        let mut input: &[u8] = b"$1000\r\nabc\r\n";
        assert!(matches!(
            read_value(&mut input).await,
            Err(QueueError::Protocol(_))
        ));
    }
}
