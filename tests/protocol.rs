// Profile Gate - Protocol Scenarios
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// End-to-end runs through the dispatcher: gating, credentials, batches,
// guestbook effects and store failures.

use profile_gate::catalog::Catalog;
use profile_gate::credential::{encode_unsigned, Intent};
use profile_gate::guestbook::{GuestbookEntry, GuestbookStore, LmdbGuestbook, MemoryGuestbook, StoreError};
use profile_gate::mcp::{CallerContext, DispatchSettings, Dispatcher};
use profile_gate::profile::ProfileStore;
use profile_gate::session::{GrantSource, SessionTracker};
use serde_json::{json, Value};
use std::sync::Arc;

/// Store that refuses every operation
struct BrokenGuestbook;

impl GuestbookStore for BrokenGuestbook {
    fn append(&self, _entry: &GuestbookEntry) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    fn list(&self) -> Result<Vec<GuestbookEntry>, StoreError> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }
}

fn dispatcher_with(store: Arc<dyn GuestbookStore>) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        Catalog::default(),
        ProfileStore::embedded().unwrap(),
        store,
        Arc::new(SessionTracker::new()),
        DispatchSettings::default(),
    ))
}

fn dispatcher() -> Arc<Dispatcher> {
    dispatcher_with(Arc::new(MemoryGuestbook::new()))
}

fn caller(credential: Option<String>) -> CallerContext {
    CallerContext::new("203.0.113.50", "scenario-agent/0.1", credential)
}

fn call(id: Value, tool: &str, args: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": {"name": tool, "arguments": args}})
}

async fn send(d: &Arc<Dispatcher>, who: &CallerContext, body: Value) -> Option<Value> {
    d.handle(who, body.to_string().as_bytes()).await
}

fn payload(response: &Value) -> &Value {
    &response["result"]["structuredContent"]
}

fn valid_token() -> String {
    encode_unsigned(&Intent {
        id: "intent-7".to_string(),
        goal: "Evaluate for a staff role".to_string(),
        mode: "recruiting".to_string(),
    })
}

#[tokio::test]
async fn denied_then_message_then_allowed() {
    let d = dispatcher();
    let who = caller(None);

    let denied = send(&d, &who, call(json!(1), "get_experience", json!({}))).await.unwrap();
    assert_eq!(payload(&denied)["error"], "access_required");
    assert!(payload(&denied)["free_tools"].as_array().unwrap().contains(&json!("leave_message")));
    assert!(d.list_guestbook().await.unwrap().is_empty());

    let left = send(
        &d,
        &who,
        call(json!(2), "leave_message", json!({"name": "Recruiter Bot", "message": "Hiring for a Rust role"})),
    )
    .await
    .unwrap();
    assert_eq!(payload(&left)["access_granted"], true);

    let allowed = send(&d, &who, call(json!(3), "get_experience", json!({}))).await.unwrap();
    assert!(payload(&allowed)["count"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn invalid_credential_is_silently_ignored() {
    let d = dispatcher();
    let who = caller(Some("definitely.not-a.token".to_string()));

    let resp = send(&d, &who, call(json!(1), "get_skills", json!({}))).await.unwrap();
    assert!(resp.get("error").is_none());
    assert_eq!(payload(&resp)["error"], "access_required");

    let state = d.sessions().get_or_create(&who.key);
    assert!(!state.has_access);
    assert_eq!(state.presented_credential.as_deref(), Some("definitely.not-a.token"));
}

#[tokio::test]
async fn credential_applies_to_every_call_in_the_same_batch() {
    let d = dispatcher();
    let who = caller(Some(valid_token()));
    let batch = json!([
        call(json!(1), "get_skills", json!({})),
        call(json!(2), "get_experience", json!({"current_only": true})),
    ]);

    let resp = send(&d, &who, batch).await.unwrap();
    let entries = resp.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(payload(&entries[0])["skills"].is_array());
    assert_eq!(payload(&entries[1])["count"], 1);
    assert_eq!(d.sessions().get_or_create(&who.key).granted_by, Some(GrantSource::Credential));
}

#[tokio::test]
async fn leave_message_twice_records_two_entries() {
    let d = dispatcher();
    let who = caller(None);
    for id in 1..=2 {
        let resp = send(
            &d,
            &who,
            call(json!(id), "leave_message", json!({"name": "Ada", "message": "hello again", "agent_id": "ada-bot"})),
        )
        .await
        .unwrap();
        assert_eq!(payload(&resp)["status"], "received");
    }

    let entries = d.list_guestbook().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert_ne!(entries[0].id, entries[1].id);
    assert_eq!(entries[0].agent_id.as_deref(), Some("ada-bot"));
    assert!(d.sessions().get_or_create(&who.key).has_access);
}

#[tokio::test]
async fn batch_entries_are_isolated_and_ordered() {
    let d = dispatcher();
    let who = caller(None);
    let batch = json!([
        {"jsonrpc": "2.0", "id": 1, "method": "ping"},
        call(json!(2), "no_such_tool", json!({})),
        "not an object",
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        call(json!("four"), "get_writing", json!({"limit": 1})),
        call(json!(5), "get_writing", json!({"limit": "many"})),
    ]);

    let resp = send(&d, &who, batch).await.unwrap();
    let entries = resp.as_array().unwrap();
    assert_eq!(entries.len(), 5);

    assert_eq!(entries[0]["id"], 1);
    assert_eq!(entries[0]["result"], json!({}));

    assert_eq!(entries[1]["id"], 2);
    assert_eq!(entries[1]["error"]["code"], -32601);

    assert_eq!(entries[2]["id"], Value::Null);
    assert_eq!(entries[2]["error"]["code"], -32600);

    assert_eq!(entries[3]["id"], "four");
    assert_eq!(payload(&entries[3])["count"], 1);

    assert_eq!(entries[4]["id"], 5);
    assert_eq!(entries[4]["error"]["code"], -32602);
}

#[tokio::test]
async fn notification_only_batch_has_no_body() {
    let d = dispatcher();
    let batch = json!([
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        {"jsonrpc": "2.0", "method": "tools/list"},
    ]);
    assert!(send(&d, &caller(None), batch).await.is_none());
}

#[tokio::test]
async fn store_failure_faults_only_the_message_call() {
    let d = dispatcher_with(Arc::new(BrokenGuestbook));
    let who = caller(None);
    let batch = json!([
        call(json!(1), "leave_message", json!({"name": "Ada", "message": "hi"})),
        call(json!(2), "get_profile", json!({})),
    ]);

    let resp = send(&d, &who, batch).await.unwrap();
    let entries = resp.as_array().unwrap();
    assert_eq!(entries[0]["error"]["code"], -32603);
    assert!(payload(&entries[1])["name"].is_string());
    assert!(!d.sessions().get_or_create(&who.key).has_access);
    assert!(d.list_guestbook().await.is_err());
}

#[tokio::test]
async fn filters_are_subsequences_of_the_unfiltered_listing() {
    let d = dispatcher();
    let who = caller(None);

    let all = send(&d, &who, call(json!(1), "get_projects", json!({}))).await.unwrap();
    let tagged = send(&d, &who, call(json!(2), "get_projects", json!({"tag": "RUST"}))).await.unwrap();
    let expected: Vec<Value> = payload(&all)["projects"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| {
            p["tags"]
                .as_array()
                .unwrap()
                .iter()
                .any(|t| t.as_str().unwrap().eq_ignore_ascii_case("rust"))
        })
        .cloned()
        .collect();
    assert_eq!(payload(&tagged)["projects"], json!(expected));

    let writing = send(&d, &who, call(json!(3), "get_writing", json!({}))).await.unwrap();
    let first_two = send(&d, &who, call(json!(4), "get_writing", json!({"limit": 2}))).await.unwrap();
    let all_writing = payload(&writing)["writing"].as_array().unwrap();
    assert_eq!(payload(&first_two)["writing"], json!(all_writing[..2].to_vec()));
}

#[tokio::test]
async fn sessions_are_per_caller() {
    let d = dispatcher();
    let alice = CallerContext::new("198.51.100.1", "agent-a", None);
    let bob = CallerContext::new("198.51.100.2", "agent-a", None);

    send(&d, &alice, call(json!(1), "leave_message", json!({"name": "Alice", "message": "hi"}))).await;
    let resp = send(&d, &bob, call(json!(2), "get_skills", json!({}))).await.unwrap();
    assert_eq!(payload(&resp)["error"], "access_required");
}

#[tokio::test]
async fn lmdb_guestbook_backs_the_dispatcher() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LmdbGuestbook::open(dir.path()).unwrap());
    let d = dispatcher_with(store);
    let who = caller(None);

    send(&d, &who, call(json!(1), "leave_message", json!({"name": "First", "message": "one"}))).await;
    send(&d, &who, call(json!(2), "leave_message", json!({"name": "Second", "message": "two"}))).await;

    let names: Vec<String> = d.list_guestbook().await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Second", "First"]);
}
