// Profile Gate - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI, HTTP server and MCP stdio server. All tool calls route through the
// dispatcher whichever way they come in.
// Usage:
//   profile-gate serve                                # HTTP JSON-RPC server
//   profile-gate stdio [--intent <token>]             # MCP over stdin/stdout
//   profile-gate tools                                # Print tool catalog
//   profile-gate call <tool> [args-json] [--intent]   # One-shot tool call
//   profile-gate guestbook                            # List guestbook entries
//   profile-gate discovery                            # Print discovery document
//   profile-gate intent <id> <goal> [--mode]          # Mint an unsigned intent token
//   profile-gate config-init [path] [--force]         # Write default config

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use profile_gate::{
    catalog::Catalog,
    config::GateConfig,
    credential::{self, Intent},
    guestbook::{GuestbookStore, LmdbGuestbook, MemoryGuestbook},
    mcp::{self, CallerContext, DispatchSettings, Dispatcher},
    paths,
    profile::ProfileStore,
    server,
    session::SessionTracker,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Env var carrying the stdio/one-shot intent credential
const INTENT_ENV: &str = "PROFILE_GATE_INTENT";

#[derive(Parser)]
#[command(name = "profile-gate")]
#[command(author = "Joseph Stone")]
#[command(version)]
#[command(about = "Profile Gate - agent-facing profile server with reciprocity-gated tools")]
struct Cli {
    /// Config file (JSON)
    #[arg(short, long, default_value_os_t = paths::default_config_path())]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP JSON-RPC server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,

        /// Keep the guestbook in memory only
        #[arg(long)]
        ephemeral: bool,
    },

    /// Run MCP over stdin/stdout (newline-delimited JSON-RPC)
    Stdio {
        /// Intent credential applied to the stdio session
        #[arg(long, env = INTENT_ENV)]
        intent: Option<String>,

        #[arg(long)]
        ephemeral: bool,
    },

    /// Print the tool catalog as MCP definitions
    Tools,

    /// One-shot tool call through a fresh session.
    /// Exits 1 on protocol error or access denial.
    Call {
        /// Tool name (get_profile, get_projects, ...)
        tool: String,

        /// Arguments as JSON object
        #[arg(default_value = "{}")]
        args: String,

        #[arg(long, env = INTENT_ENV)]
        intent: Option<String>,

        #[arg(long)]
        ephemeral: bool,
    },

    /// List guestbook entries, newest first
    Guestbook,

    /// Print the discovery document
    Discovery,

    /// Mint an unsigned intent credential for testing
    Intent {
        id: String,
        goal: String,

        #[arg(long, default_value = "research")]
        mode: String,
    },

    /// Write a default config file
    ConfigInit {
        /// Destination (defaults to --config)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: &std::path::Path) -> Result<GateConfig> {
    let mut config = GateConfig::load(path)?;
    config.apply_env();
    config.validate().with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

fn build_dispatcher(config: &GateConfig, ephemeral: bool) -> Result<Arc<Dispatcher>> {
    let profile = ProfileStore::open(config.profile_path.as_deref())
        .context("Failed to load profile document")?;

    let guestbook: Arc<dyn GuestbookStore> = if ephemeral {
        log::warn!("ephemeral mode: guestbook entries are kept in memory only");
        Arc::new(MemoryGuestbook::new())
    } else {
        let dir = config.guestbook_dir();
        Arc::new(
            LmdbGuestbook::open(&dir)
                .with_context(|| format!("Failed to open guestbook LMDB at {:?}", dir))?,
        )
    };

    Ok(Arc::new(Dispatcher::new(
        Catalog::new(&config.limits),
        profile,
        guestbook,
        Arc::new(SessionTracker::new()),
        DispatchSettings::from_config(config),
    )))
}

/// True when a tools/call response is a protocol error or an access denial
fn call_failed(response: &Value) -> bool {
    response.get("error").is_some()
        || response["result"]["structuredContent"]["error"] == "access_required"
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (safe if already init). stderr only; stdout is JSON.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, ephemeral } => {
            let mut config = load_config(&cli.config)?;
            if let Some(bind) = bind {
                config.rebind(bind);
                config.validate()?;
            }
            let dispatcher = build_dispatcher(&config, ephemeral)?;
            server::serve(config, dispatcher).await?;
        }

        Commands::Stdio { intent, ephemeral } => {
            let config = load_config(&cli.config)?;
            let dispatcher = build_dispatcher(&config, ephemeral)?;
            mcp::run_stdio(dispatcher, intent).await?;
        }

        Commands::Tools => {
            let config = load_config(&cli.config)?;
            let catalog = Catalog::new(&config.limits);
            println!("{}", serde_json::to_string_pretty(&json!({ "tools": catalog.definitions() }))?);
        }

        Commands::Call { tool, args, intent, ephemeral } => {
            let args: Value = serde_json::from_str(&args)
                .with_context(|| format!("Invalid args JSON: {}", args))?;
            if !args.is_object() {
                bail!("args must be a JSON object");
            }

            let config = load_config(&cli.config)?;
            let dispatcher = build_dispatcher(&config, ephemeral)?;
            let request = json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "tools/call",
                "params": { "name": tool, "arguments": args },
            });
            let caller = CallerContext::stdio(intent);
            let response = dispatcher
                .handle(&caller, request.to_string().as_bytes())
                .await
                .context("dispatcher returned no response")?;

            let shown = response["result"]
                .get("structuredContent")
                .unwrap_or(&response);
            println!("{}", serde_json::to_string_pretty(shown)?);

            if call_failed(&response) {
                std::process::exit(1);
            }
        }

        Commands::Guestbook => {
            let config = load_config(&cli.config)?;
            let dispatcher = build_dispatcher(&config, false)?;
            let entries = dispatcher.list_guestbook().await?;
            println!("{}", serde_json::to_string_pretty(&json!({ "count": entries.len(), "entries": entries }))?);
        }

        Commands::Discovery => {
            let config = load_config(&cli.config)?;
            let dispatcher = build_dispatcher(&config, true)?;
            println!("{}", serde_json::to_string_pretty(&dispatcher.discovery_document())?);
        }

        Commands::Intent { id, goal, mode } => {
            let token = credential::encode_unsigned(&Intent { id, goal, mode });
            println!("{}", token);
        }

        Commands::ConfigInit { path, force } => {
            let path = path.unwrap_or(cli.config);
            if path.exists() && !force {
                bail!("{:?} already exists (use --force to overwrite)", path);
            }
            GateConfig::default()
                .save(&path)
                .with_context(|| format!("Failed to write config {:?}", path))?;
            println!("Default config written to {:?}", path);
        }
    }

    Ok(())
}
