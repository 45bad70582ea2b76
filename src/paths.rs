// Profile Gate - Path Resolution
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Single source of truth for data root resolution.
// Walk-up discovery from binary location, then PROFILE_GATE_ROOT, then cwd.
// Cached via OnceLock for zero-overhead repeated access.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static DATA_ROOT_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Environment variable that pins the data root.
pub const ROOT_ENV: &str = "PROFILE_GATE_ROOT";

/// Find the Profile Gate data root.
///
/// Resolution order:
///   1. Walk up from binary location looking for Cargo.toml
///   2. PROFILE_GATE_ROOT environment variable
///   3. Current working directory
pub fn data_root() -> &'static Path {
    DATA_ROOT_CACHE.get_or_init(|| {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(root) = exe.canonicalize().ok().as_deref().and_then(find_marker_dir) {
                return root;
            }
        }

        if let Ok(root) = std::env::var(ROOT_ENV) {
            let p = PathBuf::from(&root);
            if p.exists() {
                return p;
            }
            log::warn!("{} points at missing directory {:?}, ignoring", ROOT_ENV, p);
        }

        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    })
}

/// Nearest ancestor of `start` that holds a Cargo.toml.
fn find_marker_dir(start: &Path) -> Option<PathBuf> {
    let mut dir = start.parent();
    while let Some(d) = dir {
        if d.join("Cargo.toml").exists() {
            return Some(d.to_path_buf());
        }
        dir = d.parent();
    }
    None
}

/// Default JSON config location.
pub fn default_config_path() -> PathBuf {
    data_root().join("profile-gate.json")
}

/// Default LMDB guestbook directory.
pub fn default_guestbook_dir() -> PathBuf {
    data_root().join("LIVE/GUESTBOOK")
}

// ============================================================================
// TESTS
// ============================================================================
