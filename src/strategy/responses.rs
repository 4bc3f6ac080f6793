//! Built-in strategies.

use std::io;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::wire::{BAD_STATUS_LINE, drain_request_head, http_date, response_head};
use super::{ResponseContext, Strategy};

/// Writes a complete buffer, flushes, and half-closes the write side so the
/// peer sees end of stream right after the last byte.
async fn finish<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_all(bytes).await?;
    writer.flush().await?;
    writer.shutdown().await
}

// ============================================================================
// ProtocolViolation
// ============================================================================

/// Ignores HTTP entirely: drains the request, then answers with a status line
/// no HTTP parser accepts, a `Date` header and a blank line. No body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtocolViolation;

#[async_trait::async_trait]
impl Strategy for ProtocolViolation {
    async fn respond(&self, mut stream: TcpStream, _ctx: &ResponseContext) -> io::Result<()> {
        let (read_half, mut write_half) = stream.split();
        drain_request_head(&mut BufReader::new(read_half)).await?;

        let date = http_date(Utc::now());
        let head = response_head(BAD_STATUS_LINE, &[("Date", &date)]);
        finish(&mut write_half, head.as_bytes()).await
    }

    fn name(&self) -> &'static str {
        "protocol-violation"
    }
}

// ============================================================================
// MissingBody
// ============================================================================

/// Sends a valid head announcing the configured content, then hangs up
/// without sending a single body byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingBody;

#[async_trait::async_trait]
impl Strategy for MissingBody {
    async fn respond(&self, mut stream: TcpStream, ctx: &ResponseContext) -> io::Result<()> {
        let (read_half, mut write_half) = stream.split();
        drain_request_head(&mut BufReader::new(read_half)).await?;

        let head = ok_head(ctx.content.len());
        finish(&mut write_half, head.as_bytes()).await
    }

    fn name(&self) -> &'static str {
        "missing-body"
    }
}

// ============================================================================
// SlowBody
// ============================================================================

/// Sends a well-formed response but drips the body out `chunk_size` bytes at
/// a time with `chunk_delay` between chunks.
///
/// Dripping stops early once the session is cancelled, leaving the body
/// truncated.
#[derive(Debug, Clone, Copy)]
pub struct SlowBody {
    chunk_delay: Duration,
    chunk_size: usize,
}

impl SlowBody {
    /// Creates a slow-body strategy. A `chunk_size` of zero is treated as one.
    #[must_use]
    pub fn new(chunk_delay: Duration, chunk_size: usize) -> Self {
        Self {
            chunk_delay,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait::async_trait]
impl Strategy for SlowBody {
    async fn respond(&self, mut stream: TcpStream, ctx: &ResponseContext) -> io::Result<()> {
        let (read_half, mut write_half) = stream.split();
        drain_request_head(&mut BufReader::new(read_half)).await?;

        let body = ctx.content.as_bytes();
        write_half.write_all(ok_head(body.len()).as_bytes()).await?;
        write_half.flush().await?;

        for (i, chunk) in body.chunks(self.chunk_size).enumerate() {
            if i > 0 {
                tokio::select! {
                    biased;
                    () = ctx.cancel.cancelled() => break,
                    () = tokio::time::sleep(self.chunk_delay) => {}
                }
            }
            write_half.write_all(chunk).await?;
            write_half.flush().await?;
        }
        write_half.shutdown().await
    }

    fn name(&self) -> &'static str {
        "slow-body"
    }
}

// ============================================================================
// ConnectionReset
// ============================================================================

/// Waits for the request to arrive and closes the socket without reading it.
/// Closing with unread data makes the kernel answer with a reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionReset;

#[async_trait::async_trait]
impl Strategy for ConnectionReset {
    async fn respond(&self, stream: TcpStream, ctx: &ResponseContext) -> io::Result<()> {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => {}
            ready = stream.readable() => ready?,
        }
        drop(stream);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "connection-reset"
    }
}

fn ok_head(content_length: usize) -> String {
    let date = http_date(Utc::now());
    let length = content_length.to_string();
    response_head(
        "HTTP/1.1 200 OK",
        &[
            ("Date", &date),
            ("Content-Type", "application/json"),
            ("Content-Length", &length),
            ("Connection", "close"),
        ],
    )
}
