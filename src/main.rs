// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Secretary command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use secretary::bridge::{AgentQuery, AgentResponse, McpBridge, ToolCallRequest};
use secretary::config::{self, SecretaryConfig};
use secretary::context::{ContextQuery, ContextStore, ContextType};
use secretary::mcp::ConnectionState;
use secretary::telemetry::{init_telemetry, TelemetryConfig};
use secretary::VERSION;

/// Secretary - MCP bridge and context store.
#[derive(Parser)]
#[command(name = "secretary")]
#[command(author, version, about = "MCP bridge and context store for agents", long_about = None)]
struct Cli {
    /// Configuration file (default: workspace .secretary.json, then ~/.secretary/config.json)
    #[arg(short, long, env = "SECRETARY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Show info-level logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Show debug-level logs
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured MCP servers
    Servers,

    /// Connect to a server and show its tools, resources and prompts
    Discover { server: String },

    /// Call a tool directly
    Call {
        server: String,
        tool: String,
        /// Tool arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
    },

    /// Answer a free-form query through the configured mappings
    Ask {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Read a resource
    Read {
        server: String,
        uri: String,
        /// Also store the resource as context entries
        #[arg(long)]
        store: bool,
    },

    /// Fetch every resource of every connected server into the context store
    Sync,

    /// Show server connection state and bridge statistics
    Status,

    /// Sync resources, then query the context store
    Query {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long)]
        topic: Option<String>,
        /// Entry type: file, project, activity or topic
        #[arg(long = "type")]
        entry_type: Option<ContextType>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = init_telemetry(&TelemetryConfig::for_cli(cli.verbose, cli.debug))?;

    let workspace_root = std::env::current_dir()?;
    let (config, path) = config::load_config(cli.config.as_deref(), &workspace_root)?;
    tracing::debug!(
        version = VERSION,
        config = ?path.as_ref().map(|p| p.display().to_string()),
        "starting secretary"
    );

    // Listing servers needs no connections.
    if let Commands::Servers = cli.command {
        return print_servers(&config, cli.format);
    }

    let store = Arc::new(ContextStore::with_default_ttl(config.context.default_ttl()));
    let sweep = config
        .context
        .cleanup_interval()
        .map(|interval| store.start_cleanup(interval));
    let bridge = McpBridge::from_config(&config, Arc::clone(&store))?;

    for (name, result) in bridge.connect_auto().await {
        if let Err(e) = result {
            eprintln!("{} {}: {}", "!".yellow(), name, e);
        }
    }

    let result = run(&config, &bridge, cli.command, cli.format).await;

    if let Some(sweep) = sweep {
        sweep.stop().await;
    }
    bridge.shutdown().await;
    result
}

async fn run(
    config: &SecretaryConfig,
    bridge: &McpBridge,
    command: Commands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Servers => print_servers(config, format)?,
        Commands::Discover { server } => {
            let discovery = bridge.discover_server(&server).await?;
            if format == OutputFormat::Json {
                return print_json(&discovery);
            }

            println!(
                "{} {} {}",
                discovery.name.bright_white().bold(),
                discovery.server_info.name.cyan(),
                discovery.server_info.version.dimmed()
            );
            println!("Protocol: {}", discovery.protocol_version);
            if let Some(instructions) = &discovery.instructions {
                println!("\n{}", instructions.dimmed());
            }
            if let Some(tools) = &discovery.tools {
                println!("\n{}", format!("Tools ({})", tools.len()).bright_cyan());
                for tool in tools {
                    println!("  {} {}", tool.name.bright_white(), tool.description.as_deref().unwrap_or("").dimmed());
                }
            }
            if let Some(resources) = &discovery.resources {
                println!("\n{}", format!("Resources ({})", resources.len()).bright_cyan());
                for resource in resources {
                    println!("  {} {}", resource.uri.bright_white(), resource.name.dimmed());
                }
            }
            if let Some(prompts) = &discovery.prompts {
                println!("\n{}", format!("Prompts ({})", prompts.len()).bright_cyan());
                for prompt in prompts {
                    println!("  {} {}", prompt.name.bright_white(), prompt.description.as_deref().unwrap_or("").dimmed());
                }
            }
        }
        Commands::Call { server, tool, args } => {
            let arguments: Value = serde_json::from_str(&args).context("--args must be a JSON object")?;
            let request = ToolCallRequest::new(server, tool, arguments);
            let response = bridge.execute_tool_call(&request).await?;
            print_response(&response, format)?;
        }
        Commands::Ask { query } => {
            let response = bridge.answer_query(&AgentQuery::new(query.join(" "))).await?;
            print_response(&response, format)?;
        }
        Commands::Read { server, uri, store } => {
            if store {
                let ids = bridge.fetch_resource_as_context(&server, &uri).await?;
                if format == OutputFormat::Json {
                    return print_json(&ids);
                }
                println!("{} stored {} entries", "✓".green(), ids.len());
                for id in ids {
                    println!("  {}", id.dimmed());
                }
                return Ok(());
            }

            let cached = bridge.read_resource(&server, &uri).await?;
            if format == OutputFormat::Json {
                return print_json(&cached);
            }
            for block in &cached.contents {
                match (&block.text, &block.blob) {
                    (Some(text), _) => println!("{}", text),
                    (None, Some(blob)) => println!(
                        "{} {} bytes of base64 ({})",
                        "binary:".dimmed(),
                        blob.len(),
                        block.mime_type.as_deref().unwrap_or("unknown type")
                    ),
                    (None, None) => {}
                }
            }
        }
        Commands::Sync => {
            let report = sync(bridge).await?;
            if format == OutputFormat::Json {
                return print_json(&report);
            }
            println!(
                "{} {} servers, {} resources, {} entries",
                "✓".green(),
                report.servers,
                report.resources,
                report.entries
            );
            if !report.skipped.is_empty() {
                println!("Skipped (no resources): {}", report.skipped.join(", ").dimmed());
            }
        }
        Commands::Status => {
            let status = bridge.status().await;
            if format == OutputFormat::Json {
                return print_json(&status);
            }
            println!("{}", "Secretary status".bright_blue().bold());
            for server in &status.servers {
                let state = match server.state {
                    ConnectionState::Ready => server.state.to_string().green(),
                    ConnectionState::Failed => server.state.to_string().red(),
                    _ => server.state.to_string().dimmed(),
                };
                println!("  {} [{}] {}", server.name.bright_white(), server.transport, state);
            }
            println!(
                "Connected: {}/{}  Cached resources: {}  Mappings: {}",
                status.connected_servers,
                status.servers.len(),
                status.cached_resources,
                status.mappings
            );
            #[cfg(feature = "telemetry")]
            println!("\n{}", secretary::telemetry::GLOBAL_METRICS.snapshot().format_report().dimmed());
        }
        Commands::Query {
            project,
            file,
            topic,
            entry_type,
            limit,
        } => {
            sync(bridge).await?;

            let mut query = ContextQuery::new().limit(limit);
            if let Some(project) = project {
                query = query.project(project);
            }
            if let Some(file) = file {
                query = query.file(file);
            }
            if let Some(topic) = topic {
                query = query.topic(topic);
            }
            if let Some(entry_type) = entry_type {
                query = query.entry_type(entry_type);
            }

            let result = bridge.store().query(&query).await;
            if format == OutputFormat::Json {
                return print_json(&result);
            }
            for entry in &result.entries {
                let preview: String = entry.content.chars().take(80).collect();
                println!(
                    "{} {} {} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    entry.entry_type.to_string().cyan(),
                    entry.source.bright_white(),
                    preview.replace('\n', " ")
                );
            }
            println!(
                "{}",
                format!("{} of {} entries{}", result.entries.len(), result.total, if result.has_more { ", more available" } else { "" }).dimmed()
            );
        }
    }
    Ok(())
}

/// Sync, reporting partial failures without aborting.
async fn sync(bridge: &McpBridge) -> anyhow::Result<secretary::bridge::SyncReport> {
    match bridge.sync_all_resources().await {
        Ok(report) => Ok(report),
        Err(secretary::BridgeError::Sync { report, failures }) => {
            for failure in &failures {
                eprintln!("{} {}", "!".yellow(), failure);
            }
            Ok(report)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_servers(config: &SecretaryConfig, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(&config.mcp_servers);
    }
    if config.mcp_servers.is_empty() {
        println!("{}", "No MCP servers configured. Add them under \"mcp_servers\" in .secretary.json".cyan());
        return Ok(());
    }
    for (name, server) in &config.mcp_servers {
        let target = match (&server.command, &server.url) {
            (Some(command), _) => format!("{} {}", command, server.args.join(" ")),
            (None, Some(url)) => url.clone(),
            (None, None) => String::new(),
        };
        let mut flags = Vec::new();
        if !server.enabled {
            flags.push("disabled");
        }
        if server.auto_connect {
            flags.push("auto-connect");
        }
        println!(
            "{} [{}] {} {}",
            name.bright_white(),
            server.transport,
            target.trim_end(),
            flags.join(", ").dimmed()
        );
    }
    Ok(())
}

fn print_response(response: &AgentResponse, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        return print_json(response);
    }
    if response.success {
        println!("{}", response.answer);
    } else {
        eprintln!("{}", response.answer.red());
    }
    println!(
        "{}",
        format!("confidence {:.2} | {}", response.confidence, response.sources.join(", ")).dimmed()
    );
    Ok(())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
