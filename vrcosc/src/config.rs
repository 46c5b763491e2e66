//! vrcosc/src/config.rs
//!
//! Endpoint configuration: defaults match VRChat (send to 9000, listen on
//! 9001, both on loopback), overridable from a JSON file and `VRCOSC_*`
//! environment variables.

use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transport::{DEFAULT_BUFFER_SIZE, ListenOptions};
use crate::{DEFAULT_LISTEN_PORT, DEFAULT_SEND_PORT, OscError, Result};

pub const ENV_REMOTE_HOST: &str = "VRCOSC_REMOTE_HOST";
pub const ENV_REMOTE_PORT: &str = "VRCOSC_REMOTE_PORT";
pub const ENV_LISTEN_HOST: &str = "VRCOSC_LISTEN_HOST";
pub const ENV_LISTEN_PORT: &str = "VRCOSC_LISTEN_PORT";
pub const ENV_BUFFER_SIZE: &str = "VRCOSC_BUFFER_SIZE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscConfig {
    /// Host VRChat (or whatever receives our sends) runs on.
    pub remote_host: String,
    pub remote_port: u16,
    /// Local address the receive loop binds to.
    pub listen_host: IpAddr,
    pub listen_port: u16,
    /// Receive buffer per datagram; larger datagrams are dropped.
    pub buffer_size: usize,
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            remote_host: Ipv4Addr::LOCALHOST.to_string(),
            remote_port: DEFAULT_SEND_PORT,
            listen_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            listen_port: DEFAULT_LISTEN_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl OscConfig {
    /// Defaults with any `VRCOSC_*` environment variables applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: OscConfig = serde_json::from_str(json)
            .map_err(|e| OscError::Configuration(format!("JSON parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let text = fs::read_to_string(p).map_err(|e| {
            OscError::Configuration(format!("Could not read {}: {e}", p.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// Applies overrides from `lookup` (normally the process environment).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_REMOTE_HOST) {
            self.remote_host = host;
        }
        if let Some(port) = lookup(ENV_REMOTE_PORT) {
            self.remote_port = parse_var(ENV_REMOTE_PORT, &port)?;
        }
        if let Some(host) = lookup(ENV_LISTEN_HOST) {
            self.listen_host = parse_var(ENV_LISTEN_HOST, &host)?;
        }
        if let Some(port) = lookup(ENV_LISTEN_PORT) {
            self.listen_port = parse_var(ENV_LISTEN_PORT, &port)?;
        }
        if let Some(size) = lookup(ENV_BUFFER_SIZE) {
            self.buffer_size = parse_var(ENV_BUFFER_SIZE, &size)?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_host.trim().is_empty() {
            return Err(OscError::Configuration("remote_host is empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(OscError::Configuration("buffer_size must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn listen_options(&self) -> ListenOptions {
        ListenOptions::new(self.listen_host, self.listen_port).buffer_size(self.buffer_size)
    }

    /// `(host, port)` as taken by [`OscTransport::connect_to`](crate::OscTransport::connect_to).
    pub fn remote_endpoint(&self) -> (&str, u16) {
        (&self.remote_host, self.remote_port)
    }
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| OscError::Configuration(format!("{key}='{raw}': {e}")))
}
