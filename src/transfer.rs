//! The duplex chunked transfer used to move a join key file between exactly
//! two parties.
//!
//! Wire framing per chunk: a flag byte (`is_final`), a little-endian `i32`
//! payload length and the payload itself. Non-final chunks carry up to
//! [`TransferConfig::max_chunk_len`] bytes of raw file content, read
//! sequentially from the start of the source file; the final chunk carries
//! `is_final = true` with a single sentinel byte and terminates the stream.
//!
//! The underlying channel is a blocking point-to-point link with no
//! independent buffering guarantee, so both parties must not start with a
//! blocking send. [`exchange_files`] assigns the ordering by rank: the
//! higher-ranked party sends all its chunks first and then receives, the
//! lower-ranked party receives first and then sends. This holds for exactly
//! two participants and does not generalize further.

use std::path::Path;

use thiserror::Error;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter},
};
use tracing::debug;

use crate::channel::{self, Channel, ErrorKind};

/// The default maximum payload bytes per non-final chunk (20 KiB).
pub const DEFAULT_CHUNK_LEN: usize = 20 * 1024;

const HEADER_LEN: usize = 5;
const FINAL_SENTINEL: u8 = 0;

/// Tuning knobs of the duplex transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    /// The maximum payload bytes per non-final chunk.
    pub max_chunk_len: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            max_chunk_len: DEFAULT_CHUNK_LEN,
        }
    }
}

/// The error raised during a duplex transfer. Framing violations are fatal
/// and abort the surrounding join.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A chunk violated the wire framing (length or sentinel mismatch).
    #[error("transfer framing violation: {0}")]
    Framing(String),
    /// The underlying channel failed.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The source or destination file could not be accessed.
    #[error("transfer file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

fn encode_chunk(is_final: bool, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(is_final as u8);
    buf.extend((payload.len() as i32).to_le_bytes());
    buf.extend(payload);
    buf
}

fn decode_chunk(bytes: &[u8]) -> Result<(bool, &[u8]), TransferError> {
    if bytes.len() < HEADER_LEN {
        return Err(TransferError::Framing(format!(
            "chunk of {} bytes is shorter than the {HEADER_LEN} byte header",
            bytes.len()
        )));
    }
    let is_final = match bytes[0] {
        0 => false,
        1 => true,
        flag => {
            return Err(TransferError::Framing(format!(
                "invalid chunk flag {flag}"
            )));
        }
    };
    let length = i32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let payload = &bytes[HEADER_LEN..];
    if length < 0 || length as usize != payload.len() {
        return Err(TransferError::Framing(format!(
            "declared length {length} does not match payload of {} bytes",
            payload.len()
        )));
    }
    if is_final && payload != [FINAL_SENTINEL] {
        return Err(TransferError::Framing(
            "final chunk must carry exactly the 1-byte sentinel".into(),
        ));
    }
    Ok((is_final, payload))
}

async fn send_chunk<C: Channel>(
    link: &mut C,
    peer: usize,
    chunk: Vec<u8>,
) -> Result<(), TransferError> {
    link.send_bytes_to(peer, chunk)
        .await
        .map_err(|e| channel::Error::new("duplex transfer", ErrorKind::Send(format!("{e:?}"))))?;
    Ok(())
}

async fn recv_chunk<C: Channel>(link: &mut C, peer: usize) -> Result<Vec<u8>, TransferError> {
    let bytes = link
        .recv_bytes_from(peer)
        .await
        .map_err(|e| channel::Error::new("duplex transfer", ErrorKind::Recv(format!("{e:?}"))))?;
    Ok(bytes)
}

/// Streams the file at `path` to `peer` in framed chunks, terminated by the
/// final sentinel chunk. Returns the number of payload bytes sent.
pub async fn send_file<C: Channel>(
    link: &mut C,
    peer: usize,
    path: impl AsRef<Path>,
    config: &TransferConfig,
) -> Result<u64, TransferError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::new(file);
    let mut buf = vec![0u8; config.max_chunk_len];
    let mut sent = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        send_chunk(link, peer, encode_chunk(false, &buf[..n])).await?;
        sent += n as u64;
    }
    send_chunk(link, peer, encode_chunk(true, &[FINAL_SENTINEL])).await?;
    debug!(peer, sent, "sent file over duplex transfer");
    Ok(sent)
}

/// Receives a framed chunk stream from `peer` and writes the payload bytes
/// to the file at `path`. Returns the number of payload bytes received.
pub async fn recv_file<C: Channel>(
    link: &mut C,
    peer: usize,
    path: impl AsRef<Path>,
) -> Result<u64, TransferError> {
    let file = File::create(path).await?;
    let mut writer = BufWriter::new(file);
    let mut received = 0u64;
    loop {
        let bytes = recv_chunk(link, peer).await?;
        let (is_final, payload) = decode_chunk(&bytes)?;
        if is_final {
            break;
        }
        writer.write_all(payload).await?;
        received += payload.len() as u64;
    }
    writer.flush().await?;
    debug!(peer, received, "received file over duplex transfer");
    Ok(received)
}

/// Exchanges two files between exactly two parties without deadlocking: the
/// higher-ranked party sends first, the lower-ranked party receives first.
/// Returns `(bytes sent, bytes received)`.
pub async fn exchange_files<C: Channel>(
    link: &mut C,
    self_rank: usize,
    peer_rank: usize,
    src: impl AsRef<Path>,
    dst: impl AsRef<Path>,
    config: &TransferConfig,
) -> Result<(u64, u64), TransferError> {
    assert_ne!(self_rank, peer_rank, "cannot exchange files with self");
    if self_rank > peer_rank {
        let sent = send_file(link, peer_rank, src, config).await?;
        let received = recv_file(link, peer_rank, dst).await?;
        Ok((sent, received))
    } else {
        let received = recv_file(link, peer_rank, dst).await?;
        let sent = send_file(link, peer_rank, src, config).await?;
        Ok((sent, received))
    }
}

/// Sends the single final-sentinel chunk, used as a lightweight readiness
/// handshake before an online phase.
pub async fn send_ready<C: Channel>(link: &mut C, peer: usize) -> Result<(), TransferError> {
    send_chunk(link, peer, encode_chunk(true, &[FINAL_SENTINEL])).await
}

/// Waits for the peer's readiness sentinel.
pub async fn recv_ready<C: Channel>(link: &mut C, peer: usize) -> Result<(), TransferError> {
    let bytes = recv_chunk(link, peer).await?;
    match decode_chunk(&bytes)? {
        (true, _) => Ok(()),
        (false, _) => Err(TransferError::Framing(
            "expected the readiness sentinel, got a data chunk".into(),
        )),
    }
}
