// Profile Gate - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Bind address, store locations, credential header, origin salt and field
// limits. Loaded from JSON, env overrides applied on top, defaults otherwise.

use anyhow::{anyhow, bail, Context};
use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Overrides `bind` when set.
pub const BIND_ENV: &str = "PROFILE_GATE_BIND";
/// Overrides `origin_salt` when set.
pub const SALT_ENV: &str = "PROFILE_GATE_SALT";

/// Master gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub bind: String,
    /// Externally visible base URL, used in the discovery document
    pub public_url: String,
    /// Profile document; the embedded sample is served when unset
    pub profile_path: Option<PathBuf>,
    pub guestbook_path: Option<PathBuf>,
    /// Header carrying the out-of-band intent credential
    pub intent_header: String,
    /// Honour CF-Connecting-IP / X-Forwarded-For for the caller origin
    pub trust_proxy_headers: bool,
    pub origin_salt: String,
    pub max_body_bytes: usize,
    pub limits: FieldLimits,
}

/// Upper bounds on guestbook fields, in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FieldLimits {
    pub name_max: usize,
    pub message_max: usize,
    pub agent_id_max: usize,
    pub contact_max: usize,
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            name_max: 100,
            message_max: 2000,
            agent_id_max: 200,
            contact_max: 200,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            public_url: "http://127.0.0.1:8787".to_string(),
            profile_path: None,
            guestbook_path: None,
            intent_header: "x-agent-intent".to_string(),
            trust_proxy_headers: false,
            origin_salt: "profile-gate".to_string(),
            max_body_bytes: 64 * 1024,
            limits: FieldLimits::default(),
        }
    }
}

impl GateConfig {
    /// Load config from JSON file, falling back to defaults
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            let config: Self = serde_json::from_str(&content)
                .with_context(|| format!("Invalid config JSON in {:?}", path))?;
            Ok(config)
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save config to JSON file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply PROFILE_GATE_* environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var(BIND_ENV) {
            log::info!("bind overridden by {}: {}", BIND_ENV, bind);
            self.rebind(bind);
        }
        if let Ok(salt) = std::env::var(SALT_ENV) {
            self.origin_salt = salt;
        }
    }

    /// Reject configs the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bind_addr()?;
        HeaderName::from_bytes(self.intent_header.as_bytes())
            .map_err(|_| anyhow!("intent_header {:?} is not a valid header name", self.intent_header))?;
        if self.max_body_bytes < 1024 {
            bail!("max_body_bytes must be at least 1024 (got {})", self.max_body_bytes);
        }
        let limits = &self.limits;
        if [limits.name_max, limits.message_max, limits.agent_id_max, limits.contact_max].contains(&0) {
            bail!("field limits must be non-zero: {:?}", limits);
        }
        Ok(())
    }

    /// Move the bind address. A public_url that mirrored the old bind follows it.
    pub fn rebind(&mut self, bind: String) {
        let mirrored = self.public_url.trim_end_matches('/') == format!("http://{}", self.bind);
        if mirrored {
            self.public_url = format!("http://{}", bind);
        }
        self.bind = bind;
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }

    /// LMDB guestbook directory
    pub fn guestbook_dir(&self) -> PathBuf {
        self.guestbook_path
            .clone()
            .unwrap_or_else(crate::paths::default_guestbook_dir)
    }

    /// Public JSON-RPC endpoint URL
    pub fn endpoint_url(&self) -> String {
        format!("{}/mcp", self.public_url.trim_end_matches('/'))
    }
}

// ============================================================================
// TESTS
// ============================================================================
