//! Inbound message loop

use tracing::{debug, info, warn};

use super::TaskContext;
use crate::error::{TaskError, TransportError};
use crate::state::Flag;

/// Waits for `tcp`, then polls the connection without blocking and logs
/// whatever text the server sends, until shutdown or the peer goes away.
pub async fn run(ctx: TaskContext) -> Result<(), TaskError> {
    let timing = &ctx.config.timing;
    if !ctx
        .state
        .wait_for(&[Flag::Tcp], timing.dependency_poll)
        .await
    {
        debug!("Shutdown before the connection was ready");
        return Ok(());
    }

    let mut buf = vec![0u8; ctx.config.receive_buffer_size];
    info!(buffer = buf.len(), "Receive loop started");

    while ctx.state.is_running() {
        if let Some(connection) = ctx.state.connection() {
            match connection.try_receive(&mut buf).await {
                Ok(Some(n)) => {
                    ctx.stats.record_received(n);
                    info!(bytes = n, message = %decode_text(&buf[..n]), "Message from server");
                }
                Ok(None) => {}
                Err(TransportError::NotConnected) if !ctx.state.is_running() => break,
                Err(e) if e.is_peer_closed() => {
                    if !ctx.state.is_running() {
                        break;
                    }
                    return Err(e.into());
                }
                Err(e) => warn!(error = %e, "Receive failed; continuing"),
            }
        }

        ctx.state.pause(timing.receive_interval).await;
    }

    info!("Receive loop stopped");
    Ok(())
}

/// Decodes UTF-8, silently dropping invalid or truncated sequences
pub fn decode_text(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    out.push_str(valid);
                }
                match e.error_len() {
                    Some(len) => bytes = &rest[len..],
                    None => return out,
                }
            }
        }
    }
}
