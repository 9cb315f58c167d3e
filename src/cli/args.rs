//! CLI argument types - shared between binary and tests

use clap::{Parser, Subcommand};

pub const DEFAULT_CONFIG_PATH: &str = "~/.config/agentlink/config.toml";

#[derive(Parser, Debug)]
#[command(name = "agentlink")]
#[command(about = "Tool-server gateway and task router for agent systems")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "AGENTLINK_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    /// Override the configured log level
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the configuration file
    Validate(ValidateArgs),
    /// Connect to every configured server and list what it offers
    Discover(DiscoverArgs),
    /// Execute one tool
    Call(CallArgs),
    /// Run a task through the router
    Route(RouteArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Print the JSON schema instead of validating
    #[arg(long)]
    pub schema: bool,
    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Only this server
    #[arg(short, long)]
    pub server: Option<String>,
    /// Include resources
    #[arg(long)]
    pub resources: bool,
}

#[derive(Parser, Debug)]
pub struct CallArgs {
    /// Tool to call: `server.tool`, or a bare tool name to search all servers
    pub target: String,
    /// Tool arguments in key=value or key:value format
    #[arg(value_name = "ARGS")]
    pub args: Vec<String>,
    /// Arguments as a JSON object; merged under key=value arguments
    #[arg(long)]
    pub json: Option<String>,
    /// Timeout in milliseconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct RouteArgs {
    /// Task as inline JSON, or `@path` to read it from a file
    pub task: String,
    /// Print the routing decision without executing it
    #[arg(long)]
    pub plan: bool,
}
