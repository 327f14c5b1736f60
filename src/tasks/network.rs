//! WiFi bring-up

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{run_blocking, TaskContext};
use crate::drivers::WifiCredentials;
use crate::error::{BringUpError, TaskError};
use crate::state::Stage;

/// Powers the radio, starts association and polls the link until it is up,
/// then publishes `wifi`.
pub async fn run(ctx: TaskContext) -> Result<(), TaskError> {
    let wifi = Arc::clone(&ctx.drivers.wifi);
    let credentials = WifiCredentials {
        ssid: ctx.config.wifi.ssid.clone(),
        password: ctx.config.wifi.password.clone(),
    };

    let radio = Arc::clone(&wifi);
    let active = run_blocking(move || {
        if !radio.is_active()? {
            radio.set_active(true)?;
        }
        radio.is_active()
    })
    .await?
    .map_err(BringUpError::Wifi)?;
    info!(active, "WiFi radio state");

    let ssid = credentials.ssid.clone();
    let radio = Arc::clone(&wifi);
    run_blocking(move || radio.connect(&credentials))
        .await?
        .map_err(BringUpError::Wifi)?;
    info!(ssid = %ssid, "Association started");

    let poll = ctx.config.timing.link_poll;
    loop {
        if !ctx.state.is_running() {
            debug!("Shutdown before the WiFi link came up");
            return Ok(());
        }

        let radio = Arc::clone(&wifi);
        if run_blocking(move || radio.is_connected())
            .await?
            .map_err(BringUpError::Wifi)?
        {
            break;
        }

        ctx.state.pause(poll).await;
    }

    if !ctx.state.is_running() {
        return Ok(());
    }

    // Address is diagnostic only; failing to read it does not block bring-up
    let radio = Arc::clone(&wifi);
    match run_blocking(move || radio.address()).await? {
        Ok(Some(addr)) => info!(ssid = %ssid, address = %addr, "WiFi connected"),
        Ok(None) => info!(ssid = %ssid, "WiFi connected, no address reported yet"),
        Err(e) => warn!(ssid = %ssid, error = %e, "WiFi connected, address lookup failed"),
    }

    ctx.state.set(Stage::Wifi);
    Ok(())
}
