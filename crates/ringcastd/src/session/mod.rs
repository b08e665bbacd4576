//! Replication sessions — the lockstep push-with-ack exchange.
//!
//! One side pushes frames, one at a time; the other stores each frame and
//! answers with the ack token before the next frame is sent. There is no
//! pipelining and no sequence number; the ack is only a go-ahead.
//!
//! `listener` runs the receiving side for every accepted connection,
//! `initiator` runs the sending side towards one peer per flood round.

pub mod initiator;
pub mod listener;

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use ringcast_core::wire::{ACK, ACK_LEN, MAX_MESSAGE_LEN, TERMINATOR};
use ringcast_services::ResolveError;

/// Everything that can end a session early. None of these is fatal beyond
/// the one session that hit it.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    UnknownPeer(#[from] ResolveError),
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed { addr: SocketAddr, source: io::Error },
    #[error("peer disconnected")]
    Disconnected,
    #[error("receive failed: {0}")]
    ReceiveFailed(io::Error),
    #[error("send failed: {0}")]
    SendFailed(io::Error),
    #[error("frame exceeds {} bytes without terminator", MAX_MESSAGE_LEN)]
    FrameTooLong,
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
}

/// Read one terminated frame. The terminator is stripped.
///
/// `Ok(None)` means the peer closed the stream cleanly between frames.
pub(crate) async fn read_frame<R>(reader: &mut R, io_timeout: Duration) -> Result<Option<Vec<u8>>, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::with_capacity(MAX_MESSAGE_LEN);
    let mut limited = reader.take(MAX_MESSAGE_LEN as u64);
    let n = tokio::time::timeout(io_timeout, limited.read_until(TERMINATOR, &mut frame))
        .await
        .map_err(|_| SessionError::Timeout("receive", io_timeout))?
        .map_err(SessionError::ReceiveFailed)?;

    if n == 0 {
        return Ok(None);
    }
    if frame.last() != Some(&TERMINATOR) {
        if n >= MAX_MESSAGE_LEN {
            return Err(SessionError::FrameTooLong);
        }
        // stream ended mid-frame
        return Err(SessionError::Disconnected);
    }
    frame.pop();
    Ok(Some(frame))
}

pub(crate) async fn send_bytes<W>(writer: &mut W, bytes: &[u8], io_timeout: Duration) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    };
    tokio::time::timeout(io_timeout, write)
        .await
        .map_err(|_| SessionError::Timeout("send", io_timeout))?
        .map_err(SessionError::SendFailed)
}

pub(crate) async fn send_ack<W>(writer: &mut W, io_timeout: Duration) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    send_bytes(writer, &ACK, io_timeout).await
}

/// Wait for the ack token. Its content is not inspected.
pub(crate) async fn recv_ack<R>(reader: &mut R, io_timeout: Duration) -> Result<(), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut ack = [0u8; ACK_LEN];
    match tokio::time::timeout(io_timeout, reader.read_exact(&mut ack)).await {
        Err(_) => Err(SessionError::Timeout("ack", io_timeout)),
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(SessionError::Disconnected),
        Ok(Err(e)) => Err(SessionError::ReceiveFailed(e)),
    }
}
