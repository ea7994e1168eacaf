//! Checklist-driven agent loop warden.
//!
//! Supervises an external text-generating agent working through a checklist
//! (`.warden/checklist.json`): one iteration per agent invocation, with
//! persisted health, budget, and criteria state deciding on every step
//! whether to continue, pause, verify, complete, or abort.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use warden::core::types::SessionStatus;
use warden::io::agent::ProcessInvoker;
use warden::io::config::load_config;
use warden::io::control::{OwnerLock, SentinelControl, request_abort, request_pause};
use warden::io::layout::{InitOptions, WardenPaths, init_layout};
use warden::io::test_run::CommandTestRunner;
use warden::io::vcs::GitVcs;
use warden::session::{IterationReport, resume_session, run_iteration, run_session};
use warden::start::start_session;
use warden::status::collect_status;
use warden::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Checklist-driven agent loop supervisor"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.warden/` scaffolding (config, starter checklist).
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Start a fresh session from the checklist definition.
    Start,
    /// Execute exactly one iteration.
    Step,
    /// Run iterations until a non-continue decision or operator request.
    Run,
    /// Print session status as JSON (health, budget, criteria, decision).
    Status,
    /// Ask the running loop to pause at its next iteration boundary.
    Pause,
    /// Return a paused/verify/aborted/crashed session to running, then run.
    Resume,
    /// Ask the running loop to abort at its next iteration boundary.
    Abort,
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = Path::new(".");
    match cli.command {
        Command::Init { force } => {
            init_layout(root, &InitOptions { force })?;
            println!("initialized .warden/ (edit .warden/checklist.json before starting)");
            Ok(exit_codes::OK)
        }
        Command::Start => {
            let outcome = start_session(root)?;
            println!(
                "started session {} with {} criteria",
                outcome.run_id, outcome.criteria_count
            );
            Ok(exit_codes::OK)
        }
        Command::Step => cmd_step(root),
        Command::Run => cmd_run(root),
        Command::Status => {
            let report = collect_status(root)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(exit_codes::OK)
        }
        Command::Pause => {
            request_pause(&WardenPaths::new(root))?;
            println!("pause requested; honored at the next iteration boundary");
            Ok(exit_codes::OK)
        }
        Command::Resume => {
            resume_session(root)?;
            println!("session resumed");
            cmd_run(root)
        }
        Command::Abort => {
            request_abort(&WardenPaths::new(root))?;
            println!("abort requested; honored at the next iteration boundary");
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_step(root: &Path) -> Result<i32> {
    let paths = WardenPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let invoker = ProcessInvoker::new(cfg.agent.command.clone());
    let owner = OwnerLock::acquire(&paths)?;

    let report = run_iteration(root, &invoker, &CommandTestRunner, &GitVcs::new(root), &owner)?;
    print_report(&report);
    Ok(status_exit_code(report.status))
}

fn cmd_run(root: &Path) -> Result<i32> {
    let paths = WardenPaths::new(root);
    let cfg = load_config(&paths.config_path)?;
    let invoker = ProcessInvoker::new(cfg.agent.command.clone());

    let outcome = run_session(
        root,
        &invoker,
        &CommandTestRunner,
        &GitVcs::new(root),
        &SentinelControl::new(paths.clone()),
        print_report,
    )?;

    println!(
        "session {} ended {} after {} iteration(s)",
        outcome.run_id,
        outcome.status.as_str(),
        outcome.iterations_executed
    );
    if let Some(decision) = &outcome.last_decision {
        println!("last decision: {} ({})", decision.action.as_str(), decision.reason);
    }
    Ok(status_exit_code(outcome.status))
}

fn print_report(report: &IterationReport) {
    println!(
        "iter {}: {} ({}){}",
        report.iter,
        report.decision.action.as_str(),
        report.decision.reason,
        report
            .decision
            .warning
            .as_deref()
            .map(|w| format!(" [warning: {w}]"))
            .unwrap_or_default()
    );
}

fn status_exit_code(status: SessionStatus) -> i32 {
    match status {
        SessionStatus::Paused => exit_codes::PAUSED,
        SessionStatus::Verify => exit_codes::VERIFY,
        SessionStatus::Aborted | SessionStatus::Crashed => exit_codes::ABORTED,
        SessionStatus::Initialized | SessionStatus::Running | SessionStatus::Completed => {
            exit_codes::OK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["warden", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["warden", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["warden", "run"]);
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn terminal_states_map_to_stable_exit_codes() {
        assert_eq!(status_exit_code(SessionStatus::Completed), exit_codes::OK);
        assert_eq!(status_exit_code(SessionStatus::Paused), exit_codes::PAUSED);
        assert_eq!(status_exit_code(SessionStatus::Verify), exit_codes::VERIFY);
        assert_eq!(status_exit_code(SessionStatus::Aborted), exit_codes::ABORTED);
    }
}
