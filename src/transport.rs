//! JSON-lines framing between byte streams and the service channels.
//!
//! One JSON record per line in each direction. The service only sees typed
//! channels, so another framing can replace this module without touching it.

use crate::message::Outbound;
use crate::service::SnapshotService;
use crate::{RenderEngine, Result};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Inbound records buffered while a job is in flight
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

/// Longest accepted inbound line, newline excluded
pub const MAX_LINE_BYTES: usize = 64 * 1024 * 1024;

/// Outcome of reading one framed line
enum Frame {
    Line,
    Oversized,
    Eof,
}

/// Read one line, newline included, into `buf`. A line longer than `limit`
/// is consumed through its newline and reported as oversized.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let n = (&mut *reader).take(limit as u64 + 1).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Frame::Eof);
    }
    if buf.len() <= limit || buf.last() == Some(&b'\n') {
        return Ok(Frame::Line);
    }
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        match chunk.iter().position(|b| *b == b'\n') {
            Some(i) => {
                reader.consume(i + 1);
                break;
            }
            None => {
                let len = chunk.len();
                reader.consume(len);
            }
        }
    }
    buf.clear();
    Ok(Frame::Oversized)
}

/// Forward each non-blank line to `inbound`. A line that is not a JSON
/// record (bad UTF-8, bad JSON, longer than `max_line`) is forwarded as a
/// plain string so it still gets a failure reply.
pub async fn read_jobs<R>(mut reader: R, inbound: mpsc::Sender<Value>, max_line: usize) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let message = match read_frame(&mut reader, &mut buf, max_line).await? {
            Frame::Eof => break,
            Frame::Oversized => {
                log::warn!("inbound record exceeds {} bytes", max_line);
                Value::String(format!("record exceeds {} bytes", max_line))
            }
            Frame::Line => match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    serde_json::from_str::<Value>(line).unwrap_or_else(|e| {
                        log::warn!("malformed inbound record: {}", e);
                        Value::String(line.to_string())
                    })
                }
                Err(e) => {
                    log::warn!("inbound record is not UTF-8: {}", e);
                    Value::String(String::from_utf8_lossy(&buf).trim().to_string())
                }
            },
        };
        if inbound.send(message).await.is_err() {
            log::debug!("service stopped accepting jobs");
            break;
        }
    }
    Ok(())
}

/// Write every reply as one line, flushing after each
pub async fn write_replies<W>(mut outbound: mpsc::Receiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = outbound.recv().await {
        let mut line = serde_json::to_vec(&reply)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Serve jobs from `reader` until EOF, replying on `writer`
pub async fn serve<E, R, W>(service: &mut SnapshotService<E>, reader: R, writer: W, queue_depth: usize) -> Result<()>
where
    E: RenderEngine,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (in_tx, in_rx) = mpsc::channel(queue_depth.max(1));
    let (out_tx, out_rx) = mpsc::channel(queue_depth.max(1));
    let (read, run, write) = tokio::join!(
        read_jobs(reader, in_tx, MAX_LINE_BYTES),
        service.run(in_rx, out_tx),
        write_replies(out_rx, writer),
    );
    run?;
    write?;
    read
}
