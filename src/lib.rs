// Profile Gate - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod paths;
pub mod config;
pub mod catalog;
pub mod gate;
pub mod credential;
pub mod session;
pub mod profile;
pub mod tools;
pub mod mcp;
pub mod server;

// ============================================================================
// LMDB MODULES
// ============================================================================

/// GUESTBOOK: LMDB-backed append-only guestbook
pub mod guestbook;
