//! Newline-delimited JSON bridge over stdin/stdout.
//!
//! Reads one `CommandEnvelope` per line and writes one `ResponseEnvelope`
//! per line. Stdout is reserved for the protocol; all diagnostics go to
//! stderr through `tracing`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::bridge::contract::{CommandEnvelope, CommandName, PARSE_ERROR_ID, ResponseEnvelope};
use crate::bridge::handler::BridgeHandler;
use crate::error::{MetasearchError, Result};

/// Run the bridge on the process's stdin and stdout until stdin closes or
/// `runtime.stop` is received.
///
/// # Errors
///
/// Returns [`MetasearchError::Channel`] if stdin or stdout fail.
pub async fn run_stdio_bridge(handler: BridgeHandler) -> Result<()> {
    let reader = BufReader::new(tokio::io::stdin());
    let writer = BufWriter::new(tokio::io::stdout());
    run_bridge(&handler, reader, writer).await
}

/// Serve commands from `reader`, writing responses to `writer`.
///
/// Commands are handled one at a time, in order.
///
/// # Errors
///
/// Returns [`MetasearchError::Channel`] on read, write or serialisation
/// failures. Malformed lines are answered, not returned as errors.
pub async fn run_bridge<R, W>(handler: &BridgeHandler, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes_read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| MetasearchError::Channel(format!("failed to read from stdin: {e}")))?;

        // EOF
        if bytes_read == 0 {
            tracing::info!("stdin closed (EOF); shutting down bridge");
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: CommandEnvelope = match serde_json::from_str(trimmed) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse command envelope");
                let response = ResponseEnvelope::error(
                    PARSE_ERROR_ID,
                    format!("failed to parse command envelope: {e}"),
                );
                write_response(&mut writer, &response).await?;
                continue;
            }
        };

        let is_stop = envelope.command == CommandName::RuntimeStop;
        let response = handler.handle(envelope).await;
        write_response(&mut writer, &response).await?;

        if is_stop && response.ok {
            tracing::info!("shutting down bridge");
            break;
        }
    }
    Ok(())
}

async fn write_response<W>(writer: &mut W, response: &ResponseEnvelope) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(response).map_err(|e| {
        MetasearchError::Channel(format!("failed to serialize response envelope: {e}"))
    })?;
    write_line(writer, &json).await
}

/// Write a single JSON line and flush.
async fn write_line<W>(writer: &mut W, json: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(json.as_bytes())
        .await
        .map_err(|e| MetasearchError::Channel(format!("failed to write to stdout: {e}")))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| MetasearchError::Channel(format!("failed to write newline to stdout: {e}")))?;
    writer
        .flush()
        .await
        .map_err(|e| MetasearchError::Channel(format!("failed to flush stdout: {e}")))?;
    Ok(())
}
