//! The protocol loop: one JSON command per input line, one JSON envelope per
//! output line.

use crate::handler::CommandHandler;
use crate::protocol::Response;
use anyhow::{Context, Result};
use futures_util::FutureExt;
use ocrw_backend::OcrBackend;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

/// Serve commands from `input` until it ends or `shutdown` resolves.
///
/// Every non-blank line gets exactly one response line, written and flushed
/// before the next line is read. Failures inside a command, including panics,
/// become `{"success": false}` envelopes. Only stream I/O faults are returned
/// as errors.
pub async fn serve<B, R, W, S>(
    handler: &mut CommandHandler<B>,
    mut input: R,
    mut output: W,
    shutdown: S,
) -> Result<()>
where
    B: OcrBackend,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Worker interrupted, shutting down");
                return Ok(());
            }
            read = input.read_until(b'\n', &mut line) => {
                read.context("Failed to read from input stream")?
            }
        };

        if read == 0 {
            debug!("Input stream closed");
            return Ok(());
        }

        // An in-flight command is dropped on shutdown, which removes its
        // staged image and kills any backend child process.
        let response = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Worker interrupted while processing a command, shutting down");
                return Ok(());
            }
            response = process_line(handler, &line) => response,
        };

        if let Some(response) = response {
            write_response(&mut output, &response).await?;
        }
    }
}

/// `None` for blank lines, which get no response.
async fn process_line<B: OcrBackend>(
    handler: &mut CommandHandler<B>,
    line: &[u8],
) -> Option<Response> {
    let text = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Some(Response::failure(format!("Invalid JSON input: {}", e))),
    };
    if text.is_empty() {
        return None;
    }

    let command: Value = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => return Some(Response::failure(format!("Invalid JSON input: {}", e))),
    };

    match AssertUnwindSafe(handler.handle(command)).catch_unwind().await {
        Ok(response) => Some(response),
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!("Unexpected error processing command: {}", message);
            Some(Response::failure(format!("Internal error: {}", message)))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn write_response<W: AsyncWrite + Unpin>(output: &mut W, response: &Response) -> Result<()> {
    let mut payload = serde_json::to_vec(response).context("Failed to serialize response")?;
    payload.push(b'\n');
    output
        .write_all(&payload)
        .await
        .context("Failed to write response")?;
    output.flush().await.context("Failed to flush response")?;
    Ok(())
}
