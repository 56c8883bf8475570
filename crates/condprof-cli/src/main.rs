use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::Result;
use condprof_core::{CommandStatus, ExecutionOutcome};
use serde_json::json;

mod dispatch;

#[derive(Parser)]
#[command(
    name = "condprof",
    about = "Maintain conditioned browser profiles: fetch, package and track published updates.",
    version
)]
struct CondprofCli {
    /// Emit machine-readable JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress status output.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v for debug, -vv for trace).
    #[arg(long, short, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Enable trace-level logging.
    #[arg(long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: CommandCli,
}

#[derive(Subcommand)]
enum CommandCli {
    /// Download and extract the latest conditioned profile for a key.
    Fetch(FetchArgs),
    /// Package a profile directory into its versioned archive.
    Pack(PackArgs),
    /// Query a platform's changelog of published updates.
    History(HistoryArgs),
}

#[derive(Args)]
struct FetchArgs {
    /// Target platform, e.g. android or linux64.
    #[arg(long)]
    platform: String,

    /// Scenario the profile was conditioned with.
    #[arg(long)]
    scenario: String,

    /// Customization the profile was conditioned with.
    #[arg(long, default_value = "default")]
    customization: String,

    /// Directory the profile is extracted into.
    #[arg(long)]
    dest: PathBuf,

    /// Artifact store root; defaults to $CONDPROF_STORE_URL.
    #[arg(long)]
    store_url: Option<String>,
}

#[derive(Args)]
struct PackArgs {
    /// Profile directory carrying an embedded condprof.json.
    #[arg(long)]
    profile: PathBuf,

    /// Destination directory for the archive.
    #[arg(long)]
    archive_dir: PathBuf,
}

#[derive(Args)]
struct HistoryArgs {
    /// Platform whose changelog to read.
    #[arg(long)]
    platform: String,

    /// Directory holding the per-platform changelogs.
    #[arg(long)]
    archive_dir: PathBuf,

    /// Resolve the latest entry at or before this time
    /// (unix seconds or RFC3339).
    #[arg(long)]
    before: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = CondprofCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let (command, outcome) = runtime.block_on(dispatch::dispatch_command(&cli.command))?;
    let code = emit_output(&cli, command, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "condprof_core={level},condprof_domain={level},condprof_cli={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_output(cli: &CondprofCli, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = match outcome.status {
        CommandStatus::Ok => 0,
        CommandStatus::UserError => 1,
        CommandStatus::Failure => 2,
    };

    if cli.json {
        let payload = json!({
            "command": command,
            "status": outcome.status,
            "message": outcome.message,
            "details": outcome.details,
            "exit_code": code,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        println!("condprof {command}: {}", outcome.message);
        if let Some(hint) = hint_from_details(outcome) {
            println!("Hint: {hint}");
        }
    }

    Ok(code)
}

fn hint_from_details(outcome: &ExecutionOutcome) -> Option<&str> {
    outcome
        .details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(serde_json::Value::as_str)
}
