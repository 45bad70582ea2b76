// Profile Gate - MCP Dispatcher (JSON-RPC 2.0)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// ALL tool calls route through this dispatcher, whatever the transport.
// Envelope parsing, batches, method routing, the access gate, parameter
// validation, executor dispatch and response envelopes.
// Exposes: get_profile, get_projects, get_writing, get_experience,
//          get_skills, leave_message

use crate::catalog::{AccessTier, Catalog, ToolId, LEAVE_MESSAGE};
use crate::config::GateConfig;
use crate::credential;
use crate::gate;
use crate::guestbook::{self, GuestbookEntry, GuestbookStore, MessageSubmission, PublicEntry, StoreError};
use crate::profile::ProfileStore;
use crate::session::{CallerKey, GrantSource, SessionTracker};
use crate::tools::{self, Arguments};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "profile-gate";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log target for the per-call command log
const CMD_TARGET: &str = "profile_gate::cmd";

/// A fault scoped to one JSON-RPC entry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Method not found: {0}")]
    MethodNotFound(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid params: {0}")]
    InvalidParams(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn code(&self) -> i64 {
        match self {
            ProtocolError::Parse(_) => -32700,
            ProtocolError::InvalidRequest(_) => -32600,
            ProtocolError::MethodNotFound(_) | ProtocolError::UnknownTool(_) => -32601,
            ProtocolError::InvalidParams(_) => -32602,
            ProtocolError::Internal(_) => -32603,
        }
    }
}

impl From<StoreError> for ProtocolError {
    fn from(e: StoreError) -> Self {
        ProtocolError::Internal(e.to_string())
    }
}

/// Who is calling, as seen by the transport
#[derive(Debug, Clone)]
pub struct CallerContext {
    pub key: CallerKey,
    /// Network origin; only ever stored hashed
    pub origin: String,
    /// Raw intent credential, if the transport carried one
    pub credential: Option<String>,
}

impl CallerContext {
    pub fn new(origin: &str, client: &str, credential: Option<String>) -> Self {
        Self {
            key: CallerKey::derive(origin, client),
            origin: origin.to_string(),
            credential,
        }
    }

    pub fn stdio(credential: Option<String>) -> Self {
        Self {
            key: CallerKey::stdio(),
            origin: "stdio".to_string(),
            credential,
        }
    }
}

/// The slice of GateConfig the dispatcher needs
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub intent_header: String,
    pub origin_salt: String,
    pub endpoint: String,
}

impl DispatchSettings {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            intent_header: config.intent_header.clone(),
            origin_salt: config.origin_salt.clone(),
            endpoint: config.endpoint_url(),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&GateConfig::default())
    }
}

// ============================================================================
// ENVELOPES
// ============================================================================

pub fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, err: &ProtocolError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": err.code(), "message": err.to_string() },
    })
}

/// MCP tool result: pretty text block plus the structured payload
fn tool_result(payload: Value) -> Value {
    let text = serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": payload,
    })
}

/// Summarize tool params for the command log (truncate large values)
fn param_summary(name: &str, args: &Map<String, Value>) -> String {
    if name == LEAVE_MESSAGE {
        let who = args.get("name").and_then(Value::as_str).unwrap_or("?");
        let len = args
            .get("message")
            .and_then(Value::as_str)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        let who: String = who.chars().take(60).collect();
        return format!("name={} message_len={}", who, len);
    }
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 300 {
        format!("{}…", s.chars().take(300).collect::<String>())
    } else {
        s
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Protocol engine shared by every transport
pub struct Dispatcher {
    catalog: Catalog,
    profile: ProfileStore,
    guestbook: Arc<dyn GuestbookStore>,
    sessions: Arc<SessionTracker>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        catalog: Catalog,
        profile: ProfileStore,
        guestbook: Arc<dyn GuestbookStore>,
        sessions: Arc<SessionTracker>,
        settings: DispatchSettings,
    ) -> Self {
        Self { catalog, profile, guestbook, sessions, settings }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Apply the caller's credential, if any. Returns true when it verified.
    pub fn prime(&self, caller: &CallerContext) -> bool {
        let Some(token) = caller.credential.as_deref() else {
            return false;
        };
        self.sessions.present_credential(&caller.key, token);
        match credential::verify(token) {
            Some(intent) => {
                self.sessions.grant(&caller.key, GrantSource::Credential);
                log::info!("session {} declared intent {} ({})", caller.key, intent.id, intent.mode);
                true
            }
            None => false,
        }
    }

    /// One inbound body: prime from the credential, then dispatch.
    /// None means there is nothing to send back.
    pub async fn handle(self: &Arc<Self>, caller: &CallerContext, body: &[u8]) -> Option<Value> {
        self.prime(caller);
        self.dispatch(caller, body).await
    }

    /// Dispatch without touching the credential
    pub async fn dispatch(self: &Arc<Self>, caller: &CallerContext, body: &[u8]) -> Option<Value> {
        let parsed: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("JSON parse error from {}: {}", caller.key, e);
                return Some(error_response(Value::Null, &ProtocolError::Parse(e.to_string())));
            }
        };
        match parsed {
            Value::Array(entries) => self.dispatch_batch(caller, entries).await,
            single => self.dispatch_entry(caller, single).await,
        }
    }

    async fn dispatch_batch(self: &Arc<Self>, caller: &CallerContext, entries: Vec<Value>) -> Option<Value> {
        if entries.is_empty() {
            return Some(error_response(
                Value::Null,
                &ProtocolError::InvalidRequest("empty batch".to_string()),
            ));
        }

        let handles: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                let id = entry.get("id").cloned();
                let this = Arc::clone(self);
                let caller = caller.clone();
                let handle = tokio::spawn(async move { this.dispatch_entry(&caller, entry).await });
                (id, handle)
            })
            .collect();

        let mut responses = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            match handle.await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(e) => {
                    log::error!("batch entry task failed: {}", e);
                    if let Some(id) = id {
                        responses.push(error_response(id, &ProtocolError::Internal("entry task failed".to_string())));
                    }
                }
            }
        }

        if responses.is_empty() {
            None
        } else {
            Some(Value::Array(responses))
        }
    }

    async fn dispatch_entry(&self, caller: &CallerContext, entry: Value) -> Option<Value> {
        let Value::Object(request) = entry else {
            return Some(error_response(
                Value::Null,
                &ProtocolError::InvalidRequest("entry must be a JSON object".to_string()),
            ));
        };
        let id = request.get("id").cloned();

        match self.route(caller, &request).await {
            Ok(result) => id.map(|id| success_response(id, result)),
            Err(err) => match id {
                Some(id) => Some(error_response(id, &err)),
                // Envelope too broken to tell whether a reply was wanted
                None if matches!(err, ProtocolError::InvalidRequest(_)) => {
                    Some(error_response(Value::Null, &err))
                }
                None => {
                    log::debug!("notification fault from {}: {}", caller.key, err);
                    None
                }
            },
        }
    }

    async fn route(&self, caller: &CallerContext, request: &Map<String, Value>) -> Result<Value, ProtocolError> {
        if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(ProtocolError::InvalidRequest("jsonrpc must be \"2.0\"".to_string()));
        }
        let method = request
            .get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidRequest("missing method".to_string()))?;

        log::debug!("received {} from {}", method, caller.key);

        match method {
            "initialize" => Ok(self.initialize_result()),
            "notifications/initialized" | "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.catalog.definitions() })),
            "tools/call" => self.call_tool(caller, request.get("params")).await,
            other => Err(ProtocolError::MethodNotFound(other.to_string())),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
            "instructions": format!(
                "Profile of {}. Free tools: {}. Gated tools: {} (call {} or send an intent credential in the {} header to unlock).",
                self.profile.profile().name,
                self.catalog.names_in(AccessTier::Free).join(", "),
                self.catalog.names_in(AccessTier::Gated).join(", "),
                LEAVE_MESSAGE,
                self.settings.intent_header,
            ),
        })
    }

    async fn call_tool(&self, caller: &CallerContext, params: Option<&Value>) -> Result<Value, ProtocolError> {
        let params = params
            .and_then(Value::as_object)
            .ok_or_else(|| ProtocolError::InvalidParams("params must be an object".to_string()))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::InvalidParams("params.name must be a string".to_string()))?;

        let Some(tool) = self.catalog.get(name) else {
            log::info!(target: CMD_TARGET, "FAIL {} | unknown tool | {}", name, caller.key);
            return Err(ProtocolError::UnknownTool(name.to_string()));
        };

        let empty = Map::new();
        let args = match params.get("arguments") {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(ProtocolError::InvalidParams("arguments must be an object".to_string()));
            }
        };

        let session = self.sessions.record_call(&caller.key, tool.name);
        log::debug!("session {} | {}", caller.key, session.status_summary());
        let decision = gate::process(tool, &session);
        if !decision.allowed {
            log::info!(target: CMD_TARGET, "DENY {} | {} | {}", tool.name, caller.key, decision.message);
            return Ok(tool_result(gate::denial_payload(
                tool.name,
                &self.catalog,
                &self.settings.intent_header,
            )));
        }

        if let Err(msg) = tool.validate(args) {
            log::info!(target: CMD_TARGET, "FAIL {} | {} | {}", tool.name, caller.key, msg);
            return Err(ProtocolError::InvalidParams(msg));
        }

        log::info!(target: CMD_TARGET, "CALL {} | {} | {}", tool.name, caller.key, param_summary(tool.name, args));

        let args = Arguments::new(args);
        let payload = match tool.id {
            ToolId::GetProfile => tools::get_profile(&self.profile, &self.catalog, &self.settings.intent_header),
            ToolId::GetProjects => tools::get_projects(&self.profile, args),
            ToolId::GetWriting => tools::get_writing(&self.profile, args),
            ToolId::GetExperience => tools::get_experience(&self.profile, args),
            ToolId::GetSkills => tools::get_skills(&self.profile, args),
            ToolId::LeaveMessage => {
                let entry = self.record_message(caller, tools::submission(args)).await.map_err(|e| {
                    log::info!(target: CMD_TARGET, "FAIL {} | {} | {}", tool.name, caller.key, e);
                    ProtocolError::from(e)
                })?;
                tools::leave_message_result(&entry, &self.catalog)
            }
        };
        Ok(tool_result(payload))
    }

    /// Append a guestbook entry, then grant the caller's session
    async fn record_message(
        &self,
        caller: &CallerContext,
        submission: MessageSubmission,
    ) -> Result<GuestbookEntry, StoreError> {
        let entry = GuestbookEntry::new(submission, &caller.origin, &self.settings.origin_salt);
        let entry = guestbook::append_entry(Arc::clone(&self.guestbook), entry).await?;
        self.sessions.grant(&caller.key, GrantSource::Guestbook);
        log::info!("guestbook entry {} recorded for session {}", entry.id, caller.key);
        Ok(entry)
    }

    /// Direct guestbook submission (HTTP POST /guestbook).
    /// Same validation and effect as the leave_message tool.
    pub async fn submit_message(
        &self,
        caller: &CallerContext,
        fields: &Map<String, Value>,
    ) -> Result<Value, ProtocolError> {
        let tool = self
            .catalog
            .get(LEAVE_MESSAGE)
            .ok_or_else(|| ProtocolError::Internal("leave_message missing from catalog".to_string()))?;
        tool.validate(fields).map_err(ProtocolError::InvalidParams)?;

        log::info!(target: CMD_TARGET, "CALL {} (direct) | {} | {}", LEAVE_MESSAGE, caller.key, param_summary(LEAVE_MESSAGE, fields));
        self.sessions.record_call(&caller.key, LEAVE_MESSAGE);
        let entry = self.record_message(caller, tools::submission(Arguments::new(fields))).await?;
        Ok(tools::leave_message_result(&entry, &self.catalog))
    }

    /// Public guestbook listing, newest first
    pub async fn list_guestbook(&self) -> Result<Vec<PublicEntry>, StoreError> {
        let entries = guestbook::list_entries(Arc::clone(&self.guestbook)).await?;
        Ok(entries.iter().map(GuestbookEntry::public).collect())
    }

    /// Body of /.well-known/mcp.json
    pub fn discovery_document(&self) -> Value {
        let summary = gate::access_summary(&self.catalog, &self.settings.intent_header);
        json!({
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
            "description": format!("Agent-facing profile of {}", self.profile.profile().name),
            "endpoint": self.settings.endpoint,
            "protocolVersion": PROTOCOL_VERSION,
            "transport": "http",
            "tools": self.catalog.names(),
            "access": {
                "free": self.catalog.names_in(AccessTier::Free),
                "gated": self.catalog.names_in(AccessTier::Gated),
            },
            "credential": {
                "header": self.settings.intent_header,
                "format": "header.payload.signature (base64url JSON, payload.intent = {id, goal, mode})",
            },
            "unlock": summary["unlock"],
        })
    }
}

// ============================================================================
// STDIO TRANSPORT
// ============================================================================

/// Newline-delimited JSON-RPC over stdin/stdout. Diagnostics go to stderr.
pub async fn run_stdio(dispatcher: Arc<Dispatcher>, credential: Option<String>) -> anyhow::Result<()> {
    log::info!("Starting {} v{} on stdio", SERVER_NAME, SERVER_VERSION);

    let caller = CallerContext::stdio(credential);
    dispatcher.prime(&caller);

    serve_lines(&dispatcher, &caller, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    log::info!("stdin closed, {} sessions seen", dispatcher.sessions().len());
    Ok(())
}

/// Line loop behind the stdio transport. Lines are raw bytes: invalid UTF-8
/// is a parse error for that line, never the end of the stream.
pub async fn serve_lines<R, W>(
    dispatcher: &Arc<Dispatcher>,
    caller: &CallerContext,
    mut reader: R,
    mut writer: W,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = buf.trim_ascii();
        if line.is_empty() {
            continue;
        }
        if let Some(response) = dispatcher.dispatch(caller, line).await {
            let mut msg = response.to_string();
            msg.push('\n');
            writer.write_all(msg.as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
