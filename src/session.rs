// Profile Gate - Session State
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// In-memory, per-caller access state. Never persisted: a restart forgets
// every grant. Access only ever moves false -> true.
// Tracks: has_access, grant source, presented credential, call history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};

/// Best-effort grouping key for one caller.
///
/// Derived from network origin + client identifier. Two agents behind one
/// NAT with the same User-Agent share a key; one agent rotating its
/// User-Agent gets several. Not an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerKey(String);

impl CallerKey {
    pub fn derive(origin: &str, client: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(origin.as_bytes());
        hasher.update(b"|");
        hasher.update(client.as_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(digest[..16].to_string())
    }

    /// Single shared key for the stdio transport and one-shot CLI calls
    pub fn stdio() -> Self {
        Self("stdio".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What unlocked a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Credential,
    Guestbook,
}

/// Access state for one caller key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub has_access: bool,
    pub presented_credential: Option<String>,
    /// First thing that granted access; later grants don't overwrite it
    pub granted_by: Option<GrantSource>,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub call_count: u64,
    pub last_tool: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            has_access: false,
            presented_credential: None,
            granted_by: None,
            created: now,
            last_seen: now,
            call_count: 0,
            last_tool: None,
        }
    }

    /// Returns true when this call flipped access on
    fn grant(&mut self, source: GrantSource) -> bool {
        if self.has_access {
            return false;
        }
        self.has_access = true;
        self.granted_by = Some(source);
        true
    }

    /// Status summary string
    pub fn status_summary(&self) -> String {
        format!(
            "Access: {} | Granted by: {} | Calls: {} | Last: {}",
            if self.has_access { "yes" } else { "no" },
            match self.granted_by {
                Some(GrantSource::Credential) => "credential",
                Some(GrantSource::Guestbook) => "guestbook",
                None => "-",
            },
            self.call_count,
            self.last_tool.as_deref().unwrap_or("none"),
        )
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-lifetime map of caller key -> session.
///
/// No eviction and no capacity bound: entries live until the process exits.
/// Owned by whoever builds the dispatcher and passed in explicitly.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: RwLock<HashMap<CallerKey, SessionState>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the caller's session, creating it on first sight
    pub fn get_or_create(&self, key: &CallerKey) -> SessionState {
        {
            let map = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(state) = map.get(key) {
                return state.clone();
            }
        }
        self.write().entry(key.clone()).or_default().clone()
    }

    /// Upgrade the caller to has_access. Idempotent.
    /// Returns true only on the call that flipped the flag.
    pub fn grant(&self, key: &CallerKey, source: GrantSource) -> bool {
        let flipped = self.write().entry(key.clone()).or_default().grant(source);
        if flipped {
            log::info!("session {} granted access via {:?}", key, source);
        }
        flipped
    }

    /// Remember the last credential this caller sent
    pub fn present_credential(&self, key: &CallerKey, token: &str) {
        self.write().entry(key.clone()).or_default().presented_credential = Some(token.to_string());
    }

    /// Record a tool call, returning the updated snapshot
    pub fn record_call(&self, key: &CallerKey, tool: &str) -> SessionState {
        let mut map = self.write();
        let state = map.entry(key.clone()).or_default();
        state.call_count += 1;
        state.last_tool = Some(tool.to_string());
        state.last_seen = Utc::now();
        state.clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sessions only ever gain access, so a map poisoned mid-update is still
    /// valid to keep using.
    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CallerKey, SessionState>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn caller_key_is_deterministic() {
        let a = CallerKey::derive("203.0.113.7", "agent/1.0");
        let b = CallerKey::derive("203.0.113.7", "agent/1.0");
        let c = CallerKey::derive("203.0.113.7", "agent/2.0");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn caller_key_separator_prevents_splicing() {
        let a = CallerKey::derive("1.2.3.4", "5|x");
        let b = CallerKey::derive("1.2.3.45", "x");
        assert_ne!(a, b);
    }

    #[test]
    fn new_session_has_no_access() {
        let tracker = SessionTracker::new();
        let key = CallerKey::derive("198.51.100.1", "curl/8");
        let state = tracker.get_or_create(&key);
        assert!(!state.has_access);
        assert!(state.granted_by.is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn grant_is_idempotent_and_keeps_first_source() {
        let tracker = SessionTracker::new();
        let key = CallerKey::stdio();
        assert!(tracker.grant(&key, GrantSource::Credential));
        assert!(!tracker.grant(&key, GrantSource::Guestbook));

        let state = tracker.get_or_create(&key);
        assert!(state.has_access);
        assert_eq!(state.granted_by, Some(GrantSource::Credential));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn grant_is_per_key() {
        let tracker = SessionTracker::new();
        let a = CallerKey::derive("a", "ua");
        let b = CallerKey::derive("b", "ua");
        tracker.grant(&a, GrantSource::Guestbook);
        assert!(tracker.get_or_create(&a).has_access);
        assert!(!tracker.get_or_create(&b).has_access);
    }

    #[test]
    fn record_call_updates_history() {
        let tracker = SessionTracker::new();
        let key = CallerKey::stdio();
        tracker.record_call(&key, "get_profile");
        let state = tracker.record_call(&key, "get_projects");
        assert_eq!(state.call_count, 2);
        assert_eq!(state.last_tool.as_deref(), Some("get_projects"));
        assert!(state.status_summary().contains("Calls: 2"));
    }

    #[test]
    fn present_credential_does_not_grant() {
        let tracker = SessionTracker::new();
        let key = CallerKey::stdio();
        tracker.present_credential(&key, "garbage");
        let state = tracker.get_or_create(&key);
        assert_eq!(state.presented_credential.as_deref(), Some("garbage"));
        assert!(!state.has_access);
    }

    #[test]
    fn concurrent_creates_and_grants_converge() {
        let tracker = Arc::new(SessionTracker::new());
        let key = CallerKey::derive("192.0.2.1", "agent");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                let key = key.clone();
                std::thread::spawn(move || {
                    tracker.get_or_create(&key);
                    if i % 2 == 0 {
                        tracker.grant(&key, GrantSource::Guestbook);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get_or_create(&key).has_access);
    }
}
