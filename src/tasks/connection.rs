//! Server connection bring-up

use tracing::{debug, info};

use super::TaskContext;
use crate::error::{BringUpError, TaskError};
use crate::state::{Connection, Flag};

/// Waits for `wifi`, connects to the fixed endpoint and publishes the
/// connection together with `tcp`.
///
/// The connect is bounded by the configured timeout and abandoned when
/// shutdown is requested while it is in flight.
pub async fn run(ctx: TaskContext) -> Result<(), TaskError> {
    let timing = &ctx.config.timing;
    if !ctx
        .state
        .wait_for(&[Flag::Wifi], timing.dependency_poll)
        .await
    {
        debug!("Shutdown before WiFi was ready; not connecting");
        return Ok(());
    }

    let endpoint = ctx.config.server.endpoint();
    let timeout = timing.connect_timeout;
    info!(endpoint = %endpoint, timeout = ?timeout, "Connecting to frame server");

    let attempt = tokio::select! {
        res = tokio::time::timeout(timeout, ctx.drivers.connector.connect(&endpoint)) => Some(res),
        _ = ctx.state.shutdown_requested(timing.dependency_poll) => None,
    };

    let stream = match attempt {
        None => {
            info!(endpoint = %endpoint, "Shutdown while connecting; connect abandoned");
            return Ok(());
        }
        Some(Ok(Ok(stream))) => stream,
        Some(Ok(Err(source))) => return Err(BringUpError::Connect { endpoint, source }.into()),
        Some(Err(_)) => return Err(BringUpError::ConnectTimeout { endpoint, timeout }.into()),
    };

    if let Err(connection) = ctx
        .state
        .publish_connection(Connection::new(endpoint.clone(), stream))
    {
        info!(endpoint = %endpoint, "Shutdown before the connection was published; closing it");
        // Close errors on an unpublished connection are irrelevant
        let _ = connection.close().await;
        return Ok(());
    }

    info!(endpoint = %endpoint, "Connected to frame server");
    Ok(())
}
