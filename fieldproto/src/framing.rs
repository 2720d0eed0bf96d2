//! Length-framed wire codec (spec.md §6). All control words are fixed-length
//! ASCII literals; the only variable-length parts of the protocol are the
//! declared node id (handshake) and the body (length-prefixed by an 8-byte
//! ASCII decimal).

use crate::error::ProtocolError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const CONNECTED: &[u8] = b"CONNECTED";
pub const ID_RECEIVED: &[u8] = b"ID_RECEIVED";
pub const READY_TO_INDEX: &[u8] = b"READY_TO_INDEX";
pub const DATA_RECEIVED: &[u8] = b"DATA_RECEIVED";
pub const PROTOCOL_ERROR: &[u8] = b"PROTOCOL_ERROR";

pub const LENGTH_PREFIX_LEN: usize = 8;
pub const MAX_DECLARED_ID_LEN: usize = 1024;
/// Upper bound on a single declared body length, per spec.md §8 property 3
/// (`0 ≤ |p| ≤ 2^26`).
pub const MAX_BODY_LEN: usize = 1 << 26;
const READ_CHUNK: usize = 4096;

/// Encodes a body length as an 8-byte zero-padded ASCII decimal
/// (e.g. `00000128`).
pub fn encode_length_prefix(len: usize) -> [u8; LENGTH_PREFIX_LEN] {
    let s = format!("{len:0width$}", width = LENGTH_PREFIX_LEN);
    let bytes = s.into_bytes();
    let mut out = [0u8; LENGTH_PREFIX_LEN];
    // `len` is bounded by MAX_BODY_LEN (< 10^8) by every caller, so the
    // formatted string always fits the fixed width.
    out.copy_from_slice(&bytes[..LENGTH_PREFIX_LEN]);
    out
}

/// Parses an 8-byte ASCII-decimal length prefix.
pub fn parse_length_prefix(bytes: &[u8; LENGTH_PREFIX_LEN]) -> Result<usize, ProtocolError> {
    let s = std::str::from_utf8(bytes).map_err(|_| ProtocolError::BadLength(bytes.to_vec()))?;
    s.parse::<usize>()
        .map_err(|_| ProtocolError::BadLength(bytes.to_vec()))
}

/// Reads exactly `buf.len()` bytes before `deadline` elapses. Maps a timeout
/// to `ProtocolError::Timeout` and EOF/reset to `ProtocolError::Closed`.
pub async fn read_exact_deadline<R>(
    reader: &mut R,
    buf: &mut [u8],
    deadline: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    match tokio::time::timeout(deadline, reader.read_exact(buf)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::Closed)
        }
        Ok(Err(err)) => Err(ProtocolError::Io(err)),
        Err(_elapsed) => Err(ProtocolError::Timeout),
    }
}

/// Reads a body of `len` bytes in chunks of up to [`READ_CHUNK`], per
/// spec.md §4.1 *AwaitingBody* ("read exactly N bytes in chunks of up to
/// 4096").
pub async fn read_body_deadline<R>(
    reader: &mut R,
    len: usize,
    deadline: Duration,
) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut body = vec![0u8; len];
    let mut read = 0;
    while read < len {
        let end = (read + READ_CHUNK).min(len);
        read_exact_deadline(reader, &mut body[read..end], deadline).await?;
        read = end;
    }
    Ok(body)
}

/// Reads a raw handshake message: up to [`MAX_DECLARED_ID_LEN`] bytes,
/// newline-stripped, returned as-is (the caller validates non-emptiness).
/// Reads one byte past the cap so a declared id that actually exceeds
/// [`MAX_DECLARED_ID_LEN`] can be distinguished from one that exactly fills
/// the buffer, rather than silently truncated (spec.md §7 "oversized
/// declared id" is a protocol violation, not a quietly-accepted value).
pub async fn read_declared_id<R>(reader: &mut R, deadline: Duration) -> Result<String, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_DECLARED_ID_LEN + 1];
    let n = match tokio::time::timeout(deadline, reader.read(&mut buf)).await {
        Ok(Ok(0)) => return Err(ProtocolError::Closed),
        Ok(Ok(n)) => n,
        Ok(Err(err)) => return Err(ProtocolError::Io(err)),
        Err(_) => return Err(ProtocolError::Timeout),
    };
    if n > MAX_DECLARED_ID_LEN {
        return Err(ProtocolError::OversizedId);
    }
    let raw = String::from_utf8_lossy(&buf[..n]);
    Ok(raw.trim_end_matches(['\n', '\r']).to_string())
}

/// Writes `bytes` before `deadline` elapses.
pub async fn write_all_deadline<W>(
    writer: &mut W,
    bytes: &[u8],
    deadline: Duration,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    match tokio::time::timeout(deadline, writer.write_all(bytes)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ProtocolError::Io(err)),
        Err(_) => Err(ProtocolError::Timeout),
    }
}

/// Expects to read exactly `expected.len()` bytes and checks they start with
/// `expected` (the node side only checks a *prefix* per spec.md §4.5 step 2,
/// since the collector may send a longer literal in future protocol
/// versions).
pub async fn expect_literal<R>(
    reader: &mut R,
    expected: &'static [u8],
    deadline: Duration,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; expected.len()];
    read_exact_deadline(reader, &mut buf, deadline).await?;
    if buf.starts_with(expected) {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedLiteral {
            expected: std::str::from_utf8(expected).unwrap_or("?"),
            got: buf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefix_round_trips() {
        for len in [0usize, 7, 128, 1 << 20] {
            let encoded = encode_length_prefix(len);
            assert_eq!(encoded.len(), LENGTH_PREFIX_LEN);
            let parsed = parse_length_prefix(&encoded).unwrap();
            assert_eq!(parsed, len);
        }
    }

    #[test]
    fn bad_length_prefix_errors() {
        let bad = *b"notanum1";
        assert!(parse_length_prefix(&bad).is_err());
    }

    #[tokio::test]
    async fn read_declared_id_accepts_exactly_the_cap() {
        let (mut a, mut b) = tokio::io::duplex(MAX_DECLARED_ID_LEN + 16);
        let id = "x".repeat(MAX_DECLARED_ID_LEN);
        write_all_deadline(&mut a, id.as_bytes(), Duration::from_secs(1))
            .await
            .unwrap();
        drop(a);
        let read = read_declared_id(&mut b, Duration::from_secs(1)).await.unwrap();
        assert_eq!(read, id);
    }

    #[tokio::test]
    async fn read_declared_id_flags_one_byte_over_the_cap() {
        let (mut a, mut b) = tokio::io::duplex(MAX_DECLARED_ID_LEN + 16);
        let id = "x".repeat(MAX_DECLARED_ID_LEN + 1);
        write_all_deadline(&mut a, id.as_bytes(), Duration::from_secs(1))
            .await
            .unwrap();
        drop(a);
        let err = read_declared_id(&mut b, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedId));
    }

    #[tokio::test]
    async fn frame_round_trip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let payload = b"[{\"hello\":1}]".to_vec();
        let prefix = encode_length_prefix(payload.len());

        write_all_deadline(&mut a, &prefix, Duration::from_secs(1))
            .await
            .unwrap();
        write_all_deadline(&mut a, &payload, Duration::from_secs(1))
            .await
            .unwrap();

        let mut prefix_buf = [0u8; LENGTH_PREFIX_LEN];
        read_exact_deadline(&mut b, &mut prefix_buf, Duration::from_secs(1))
            .await
            .unwrap();
        let len = parse_length_prefix(&prefix_buf).unwrap();
        let body = read_body_deadline(&mut b, len, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(body, payload);
    }
}
