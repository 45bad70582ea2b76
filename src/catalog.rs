// Profile Gate - Tool Catalog
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// The fixed set of tools agents may call. Each descriptor carries its access
// tier and parameter schema; tools/list renders them as MCP definitions and
// the dispatcher validates arguments against the same specs.

use crate::config::FieldLimits;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const GET_PROFILE: &str = "get_profile";
pub const GET_PROJECTS: &str = "get_projects";
pub const GET_WRITING: &str = "get_writing";
pub const GET_EXPERIENCE: &str = "get_experience";
pub const GET_SKILLS: &str = "get_skills";
pub const LEAVE_MESSAGE: &str = "leave_message";

/// Which callers may run a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessTier {
    /// Anyone, no prior interaction
    Free,
    /// Only callers whose session holds access
    Gated,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Free => "free",
            AccessTier::Gated => "gated",
        }
    }
}

/// Typed tool identity, one per catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    GetProfile,
    GetProjects,
    GetWriting,
    GetExperience,
    GetSkills,
    LeaveMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Boolean,
    Integer,
}

impl ParamType {
    fn json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Boolean => "boolean",
            ParamType::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub description: &'static str,
    pub required: bool,
    /// Upper bound in characters (strings only)
    pub max_length: Option<usize>,
}

impl ParamSpec {
    fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self { name, kind, description, required: false, max_length: None }
    }

    fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub name: &'static str,
    pub description: &'static str,
    pub tier: AccessTier,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// JSON Schema for the tool's arguments
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = json!({"type": p.kind.json_type(), "description": p.description});
            if let Some(max) = p.max_length {
                prop["maxLength"] = json!(max);
            }
            if p.kind == ParamType::String && p.required {
                prop["minLength"] = json!(1);
            }
            if p.kind == ParamType::Integer {
                prop["minimum"] = json!(0);
            }
            properties.insert(p.name.to_string(), prop);
        }
        let required: Vec<&str> = self.params.iter().filter(|p| p.required).map(|p| p.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// MCP tool definition as returned by tools/list
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
            "annotations": {
                "readOnlyHint": self.id != ToolId::LeaveMessage,
                "access": self.tier.as_str(),
            }
        })
    }

    /// Check arguments against the declared params.
    /// Unknown extra keys are ignored.
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), String> {
        for p in &self.params {
            let value = match args.get(p.name) {
                None | Some(Value::Null) => {
                    if p.required {
                        return Err(format!("missing required parameter '{}'", p.name));
                    }
                    continue;
                }
                Some(v) => v,
            };
            match p.kind {
                ParamType::String => {
                    let s = value
                        .as_str()
                        .ok_or_else(|| format!("parameter '{}' must be a string", p.name))?;
                    if p.required && s.trim().is_empty() {
                        return Err(format!("parameter '{}' must not be empty", p.name));
                    }
                    if let Some(max) = p.max_length {
                        let len = s.trim().chars().count();
                        if len > max {
                            return Err(format!(
                                "parameter '{}' is too long ({} chars, max {})",
                                p.name, len, max
                            ));
                        }
                    }
                }
                ParamType::Boolean => {
                    if !value.is_boolean() {
                        return Err(format!("parameter '{}' must be a boolean", p.name));
                    }
                }
                ParamType::Integer => {
                    if value.as_u64().is_none() {
                        return Err(format!("parameter '{}' must be a non-negative integer", p.name));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Ordered, immutable tool registry
#[derive(Debug, Clone)]
pub struct Catalog {
    tools: Vec<ToolDescriptor>,
}

impl Catalog {
    pub fn new(limits: &FieldLimits) -> Self {
        let tools = vec![
            ToolDescriptor {
                id: ToolId::GetProfile,
                name: GET_PROFILE,
                description: "Core profile: name, headline, location, summary and links. Also lists which tools are free and which are gated.",
                tier: AccessTier::Free,
                params: vec![],
            },
            ToolDescriptor {
                id: ToolId::GetProjects,
                name: GET_PROJECTS,
                description: "Projects with descriptions, tags and links. Filter by tag (case-insensitive) or featured flag.",
                tier: AccessTier::Free,
                params: vec![
                    ParamSpec::optional("tag", ParamType::String, "Only projects carrying this tag"),
                    ParamSpec::optional("featured_only", ParamType::Boolean, "Only featured projects"),
                ],
            },
            ToolDescriptor {
                id: ToolId::GetWriting,
                name: GET_WRITING,
                description: "Published articles and posts, newest first as listed. Filter by platform, cap with limit.",
                tier: AccessTier::Free,
                params: vec![
                    ParamSpec::optional("platform", ParamType::String, "Only pieces from this platform (e.g. blog, medium)"),
                    ParamSpec::optional("limit", ParamType::Integer, "Maximum number of pieces to return"),
                ],
            },
            ToolDescriptor {
                id: ToolId::GetExperience,
                name: GET_EXPERIENCE,
                description: "Work history with roles, dates and highlights. Gated: call leave_message first or send an intent credential.",
                tier: AccessTier::Gated,
                params: vec![
                    ParamSpec::optional("current_only", ParamType::Boolean, "Only roles held today"),
                ],
            },
            ToolDescriptor {
                id: ToolId::GetSkills,
                name: GET_SKILLS,
                description: "Skills grouped by category. Gated: call leave_message first or send an intent credential.",
                tier: AccessTier::Gated,
                params: vec![
                    ParamSpec::optional("category", ParamType::String, "Only this skill category"),
                ],
            },
            ToolDescriptor {
                id: ToolId::LeaveMessage,
                name: LEAVE_MESSAGE,
                description: "Sign the guestbook: say who you are and why you're here. Unlocks the gated tools for your session.",
                tier: AccessTier::Free,
                params: vec![
                    ParamSpec::optional("name", ParamType::String, "Your name, or the name of the human you act for")
                        .required()
                        .max_length(limits.name_max),
                    ParamSpec::optional("message", ParamType::String, "Why you are reaching out")
                        .required()
                        .max_length(limits.message_max),
                    ParamSpec::optional("agent_id", ParamType::String, "Identifier of the calling agent")
                        .max_length(limits.agent_id_max),
                    ParamSpec::optional("contact", ParamType::String, "How to reach you back (email, URL)")
                        .max_length(limits.contact_max),
                ],
            },
        ];

        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }

    /// Names in one tier, catalog order
    pub fn names_in(&self, tier: AccessTier) -> Vec<&'static str> {
        self.tools.iter().filter(|t| t.tier == tier).map(|t| t.name).collect()
    }

    pub fn definitions(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(&FieldLimits::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
