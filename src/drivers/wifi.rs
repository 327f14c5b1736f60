//! NetworkManager-backed WiFi station

use std::net::IpAddr;
use std::process::Command;
use tracing::debug;

use super::{WifiCredentials, WifiDriver};
use crate::error::DriverError;

/// WiFi driver that shells out to `nmcli` in terse mode
#[derive(Debug, Clone)]
pub struct NmcliWifi {
    interface: String,
}

impl NmcliWifi {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn nmcli(&self, args: &[&str]) -> Result<String, DriverError> {
        let output = Command::new("nmcli").args(args).output()?;

        if !output.status.success() {
            return Err(DriverError::Command {
                command: describe(args),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn device_field(&self, field: &str) -> Result<String, DriverError> {
        self.nmcli(&["-t", "-f", field, "device", "show", &self.interface])
    }
}

impl WifiDriver for NmcliWifi {
    fn is_active(&self) -> Result<bool, DriverError> {
        let out = self.nmcli(&["-t", "-f", "WIFI", "radio"])?;
        Ok(out.trim() == "enabled")
    }

    fn set_active(&self, active: bool) -> Result<(), DriverError> {
        let state = if active { "on" } else { "off" };
        self.nmcli(&["radio", "wifi", state])?;
        Ok(())
    }

    fn connect(&self, credentials: &WifiCredentials) -> Result<(), DriverError> {
        debug!(interface = %self.interface, ssid = %credentials.ssid, "Requesting association");
        // `--wait 0` returns as soon as activation is queued
        self.nmcli(&[
            "--wait",
            "0",
            "device",
            "wifi",
            "connect",
            &credentials.ssid,
            "password",
            &credentials.password,
            "ifname",
            &self.interface,
        ])
        .map_err(|e| match e {
            // Keep the passphrase out of error messages
            DriverError::Command { detail, .. } => DriverError::Command {
                command: format!("nmcli device wifi connect {}", credentials.ssid),
                detail,
            },
            other => other,
        })?;
        Ok(())
    }

    fn is_connected(&self) -> Result<bool, DriverError> {
        let out = self.device_field("GENERAL.STATE")?;
        Ok(parse_device_state(&out) == Some(100))
    }

    fn address(&self) -> Result<Option<IpAddr>, DriverError> {
        let out = self.device_field("IP4.ADDRESS")?;
        Ok(parse_ipv4_address(&out))
    }
}

fn describe(args: &[&str]) -> String {
    let mut command = String::from("nmcli");
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}

/// Parses `GENERAL.STATE:100 (connected)` into the numeric NM device state
fn parse_device_state(output: &str) -> Option<u32> {
    output
        .lines()
        .find_map(|line| line.strip_prefix("GENERAL.STATE:"))
        .and_then(|value| value.split_whitespace().next())
        .and_then(|code| code.parse().ok())
}

/// Parses the first `IP4.ADDRESS[n]:a.b.c.d/len` line
fn parse_ipv4_address(output: &str) -> Option<IpAddr> {
    output
        .lines()
        .filter(|line| line.starts_with("IP4.ADDRESS"))
        .filter_map(|line| line.split_once(':').map(|(_, value)| value))
        .filter_map(|value| value.split('/').next())
        .find_map(|addr| addr.trim().parse().ok())
}
