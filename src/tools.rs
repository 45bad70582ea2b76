// Profile Gate - Tool Executors
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One executor per catalog entry. Arguments arrive already validated
// against the tool's ParamSpecs, so lookups here only interpret them.
// leave_message's store append and session grant live in the dispatcher;
// this module builds the submission and the result payload.

use crate::catalog::{AccessTier, Catalog};
use crate::gate;
use crate::guestbook::{GuestbookEntry, MessageSubmission};
use crate::profile::ProfileStore;
use serde_json::{json, Map, Value};

/// Read-only view over validated tool arguments
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a>(&'a Map<String, Value>);

impl<'a> Arguments<'a> {
    pub fn new(args: &'a Map<String, Value>) -> Self {
        Self(args)
    }

    /// Trimmed string argument; empty or whitespace counts as absent
    pub fn text(&self, name: &str) -> Option<&'a str> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Boolean argument, false when absent
    pub fn flag(&self, name: &str) -> bool {
        self.0.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn count(&self, name: &str) -> Option<usize> {
        self.0
            .get(name)
            .and_then(Value::as_u64)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
    }
}

/// get_profile: profile fields plus the tier overview
pub fn get_profile(store: &ProfileStore, catalog: &Catalog, intent_header: &str) -> Value {
    let mut result = json!(store.profile());
    if let Some(obj) = result.as_object_mut() {
        obj.insert("access".to_string(), gate::access_summary(catalog, intent_header));
    }
    result
}

pub fn get_projects(store: &ProfileStore, args: Arguments<'_>) -> Value {
    let projects = store.projects(args.text("tag"), args.flag("featured_only"));
    json!({"count": projects.len(), "projects": projects})
}

pub fn get_writing(store: &ProfileStore, args: Arguments<'_>) -> Value {
    let writing = store.writing(args.text("platform"), args.count("limit"));
    json!({"count": writing.len(), "writing": writing})
}

pub fn get_experience(store: &ProfileStore, args: Arguments<'_>) -> Value {
    let experience = store.experience(args.flag("current_only"));
    json!({"count": experience.len(), "experience": experience})
}

pub fn get_skills(store: &ProfileStore, args: Arguments<'_>) -> Value {
    let skills = store.skills(args.text("category"));
    json!({"count": skills.len(), "skills": skills})
}

/// Guestbook submission from leave_message arguments
pub fn submission(args: Arguments<'_>) -> MessageSubmission {
    MessageSubmission::new(
        args.text("name").unwrap_or_default(),
        args.text("message").unwrap_or_default(),
        args.text("agent_id"),
        args.text("contact"),
    )
}

/// Result of a recorded leave_message
pub fn leave_message_result(entry: &GuestbookEntry, catalog: &Catalog) -> Value {
    let unlocked = catalog.names_in(AccessTier::Gated);
    json!({
        "status": "received",
        "id": entry.id,
        "access_granted": true,
        "unlocked_tools": unlocked,
        "message": format!(
            "Thanks, {}. Your message was recorded and {} are now available to you.",
            entry.name,
            unlocked.join(" and ")
        ),
    })
}

// ============================================================================
// TESTS
// ============================================================================
