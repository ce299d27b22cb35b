use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use serde::Deserialize;
use url::Url;

use crate::http::alias::AliasKind;

/// Smallest output buffer that still holds a full error response.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Smallest input stream that holds a reasonable request head.
pub const MIN_STREAM_SIZE: usize = 256;

/// Server configuration.
///
/// Read from the YAML file named by `CINDER_CONFIG` when set; `LISTEN`
/// overrides the listen address either way. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    /// Sent in the `Server` header.
    pub server_name: String,
    pub server_admin: Option<String>,
    pub document_root: PathBuf,
    pub directory_index: String,
    pub default_type: String,
    pub keep_alive: KeepAliveConfig,
    /// Size of the request pool.
    pub max_connections: usize,
    /// Output buffer per connection. There is no growth path.
    pub buffer_size: usize,
    /// Input buffer per connection; a request head must fit.
    pub client_stream_size: usize,
    pub max_post_size: usize,
    pub aliases: Vec<AliasConfig>,
    /// Extension to content type, on top of the built-in table.
    pub mime_types: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct KeepAliveConfig {
    /// Idle seconds before a kept-alive connection is dropped.
    pub timeout: u32,
    /// Requests allowed on one connection.
    pub max: u32,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            timeout: 10,
            max: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AliasConfig {
    pub kind: AliasKind,
    /// URI prefix.
    pub from: String,
    /// Filesystem path, or the redirect target.
    pub to: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            server_name: concat!("Cinder/", env!("CARGO_PKG_VERSION")).to_string(),
            server_admin: None,
            document_root: PathBuf::from("/var/www"),
            directory_index: "index.html".to_string(),
            default_type: "text/plain".to_string(),
            keep_alive: KeepAliveConfig::default(),
            max_connections: 256,
            buffer_size: 4096,
            client_stream_size: 8192,
            max_post_size: 1 << 20,
            aliases: Vec::new(),
            mime_types: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("CINDER_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.listen_addr = addr;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_connections > 0, "max_connections must be at least 1");
        ensure!(
            self.buffer_size >= MIN_BUFFER_SIZE,
            "buffer_size must be at least {MIN_BUFFER_SIZE} bytes"
        );
        ensure!(
            self.client_stream_size >= MIN_STREAM_SIZE,
            "client_stream_size must be at least {MIN_STREAM_SIZE} bytes"
        );
        ensure!(
            !self.server_name.contains(['\r', '\n']),
            "server_name must be a single line"
        );

        for alias in &self.aliases {
            ensure!(alias.from.starts_with('/'), "alias prefix {:?} must start with '/'", alias.from);
            if alias.kind == AliasKind::Redirect && !alias.to.starts_with('/') {
                Url::parse(&alias.to)
                    .with_context(|| format!("redirect target {:?} is not a URL", alias.to))?;
            }
        }
        Ok(())
    }
}
