//! devflow - phase-based development workflows for AI coding assistants.
//!
//! Runs the MCP server and offers a few commands to inspect and manage the
//! conversation of the current project.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use devflow::mcp::{MCPServer, ToolHandler};
use devflow::plan::analyze;
use devflow::workflow::load_file;
use devflow::{
    Config, ConversationIdentity, ConversationManager, FlowError, PlanManager, StateStore,
    WorkflowLoader,
};

/// Phase-based development workflows for AI coding assistants
#[derive(Parser)]
#[command(name = "devflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Project directory (defaults to the current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio
    Serve,

    /// Show the conversation for this project and branch
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List available workflows
    Workflows {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow file
    Validate {
        /// Workflow YAML file
        file: PathBuf,
    },

    /// Show the plan document and its progress
    Plan {
        /// Only print the progress summary
        #[arg(short, long)]
        summary: bool,
    },

    /// Delete the conversation state and plan for this project and branch
    Reset {
        /// Confirm the reset
        #[arg(short = 'y', long)]
        yes: bool,

        /// Reason recorded with the reset
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show configuration
    Config {
        /// Show config file paths
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol; logs go to stderr.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let project = cli.project.as_path();
    match cli.command {
        Commands::Serve => cmd_serve(project),
        Commands::Status { json } => cmd_status(project, json),
        Commands::Workflows { json } => cmd_workflows(project, json),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan { summary } => cmd_plan(project, summary),
        Commands::Reset { yes, reason } => cmd_reset(project, yes, reason.as_deref()),
        Commands::Config { path } => cmd_config(project, path),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

fn open_manager(project: &Path, config: &Config) -> Result<ConversationManager> {
    let db = config.database_path(project);
    let store = StateStore::open(&db)
        .with_context(|| format!("Failed to open state database {}", db.display()))?;
    Ok(ConversationManager::new(store))
}

/// Run the MCP server.
fn cmd_serve(project: &Path) -> Result<()> {
    let config = Config::load(project);
    let handler = ToolHandler::open(project, config).context("Failed to start MCP server")?;
    let mut server = MCPServer::new(handler);
    server.run(io::stdin().lock(), io::stdout())?;
    Ok(())
}

/// Show the current conversation.
fn cmd_status(project: &Path, json: bool) -> Result<()> {
    let config = Config::load(project);
    let manager = open_manager(project, &config)?;
    let identity = ConversationIdentity::derive(project);

    let state = match manager.resolve(&identity) {
        Ok(state) => state,
        Err(FlowError::ConversationNotFound { .. }) => {
            if json {
                println!("null");
            } else {
                println!("No development conversation for branch '{}'.", identity.branch);
                println!("Start one from your assistant with the start_development tool.");
            }
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let plan = PlanManager::new().analyze_file(&state.plan_file_path);
    println!("Conversation: {}", state.id);
    println!("Branch:       {}", state.branch);
    println!("Workflow:     {}", state.workflow_name);
    println!("Phase:        {}", state.current_phase);
    if let Some(progress) = plan.phase_progress(&state.current_phase) {
        println!("Progress:     {}/{} tasks", progress.completed, progress.total);
    }
    println!("Plan:         {}", state.plan_file_path.display());
    println!("Reviews:      {}", if state.require_reviews { "required" } else { "optional" });
    println!("Updated:      {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

/// List workflows.
fn cmd_workflows(project: &Path, json: bool) -> Result<()> {
    let config = Config::load(project);
    let loader = WorkflowLoader::new(project).with_default(&config.workflow.default);
    let workflows = loader.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    for wf in &workflows {
        let marker = if wf.name == config.workflow.default { "*" } else { " " };
        println!("{marker} {:<12} [{}] {}", wf.name, wf.source, wf.description);
        println!("    {}", wf.phases.join(" → "));
    }
    Ok(())
}

/// Validate a workflow file without falling back.
fn cmd_validate(file: &Path) -> Result<()> {
    let def = load_file(file).with_context(|| format!("{} is not a valid workflow", file.display()))?;
    println!("✓ {def}");
    for (_, phase) in def.phases() {
        println!("  {:<16} {} transitions", phase.id, phase.transitions.len());
    }
    Ok(())
}

/// Show the plan document.
fn cmd_plan(project: &Path, summary: bool) -> Result<()> {
    let config = Config::load(project);
    let manager = open_manager(project, &config)?;
    let identity = ConversationIdentity::derive(project);
    let path = match manager.resolve(&identity) {
        Ok(state) => state.plan_file_path,
        Err(FlowError::ConversationNotFound { .. }) => identity.plan_file_path(),
        Err(e) => return Err(e.into()),
    };

    let Some(content) = PlanManager::new().info(&path).content else {
        println!("No plan file at {}", path.display());
        return Ok(());
    };

    if !summary {
        println!("{content}");
        return Ok(());
    }

    let analysis = analyze(&content);
    println!("{}: {}/{} tasks complete", path.display(), analysis.tasks_completed, analysis.tasks_total);
    for section in analysis.sections.iter().filter(|s| s.total > 0) {
        let mark = if section.is_complete() { "✓" } else { " " };
        println!("  {mark} {:<24} {}/{}", section.heading, section.completed, section.total);
    }
    if !analysis.decisions.is_empty() {
        println!("  Decisions: {}", analysis.decisions.len());
    }
    Ok(())
}

/// Reset the conversation.
fn cmd_reset(project: &Path, yes: bool, reason: Option<&str>) -> Result<()> {
    let config = Config::load(project);
    let manager = open_manager(project, &config)?;
    let identity = ConversationIdentity::derive(project);

    let outcome = match manager.reset(&identity, yes, reason) {
        Ok(outcome) => outcome,
        Err(FlowError::ResetNotConfirmed) => {
            anyhow::bail!("Refusing to reset without confirmation. Re-run with --yes.")
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", outcome.message);
    for item in &outcome.reset_items {
        println!("  - {item}");
    }
    Ok(())
}

/// Show configuration.
fn cmd_config(project: &Path, show_path: bool) -> Result<()> {
    if show_path {
        if let Some(dir) = Config::config_dir() {
            println!("{}", dir.join("config.toml").display());
        }
        println!("{}", Config::project_file(project).display());
        return Ok(());
    }

    let config = Config::load(project);
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "devflow", &mut io::stdout());
}
