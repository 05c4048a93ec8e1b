//! macship CLI entry point.

use clap::{Parser, Subcommand};
use macship::config::MacshipConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cli;

/// macship - build, relocate, sign, notarize and package macOS app bundles
#[derive(Parser, Debug)]
#[command(name = "macship")]
#[command(about = "Release pipeline for macOS application bundles")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./macship.toml, then the user config dir).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Work directory (overrides the configured one).
    #[arg(long, global = true, value_name = "DIR")]
    workdir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build third-party dependencies into the install prefix.
    Deps(cli::deps::DepsCmd),

    /// Build the application bundle.
    Build(cli::build::BuildCmd),

    /// Make the bundle self-contained.
    Relocate(cli::relocate::RelocateCmd),

    /// Sign the bundle.
    Sign(cli::sign::SignCmd),

    /// Submit the bundle for notarization.
    Notarize(cli::notarize::NotarizeCmd),

    /// Check a pending notarization.
    NotaryStatus(cli::notarize::NotaryStatusCmd),

    /// Staple the notarization ticket.
    Staple(cli::staple::StapleCmd),

    /// Package the bundle into a disk image.
    Dmg(cli::dmg::DmgCmd),

    /// Show the pipeline state.
    #[command(alias = "st")]
    Status(cli::status::StatusCmd),

    /// Inspect or create the configuration.
    #[command(subcommand)]
    Config(cli::config::ConfigCmd),
}

fn main() {
    let cli = Cli::parse();

    init_logging();

    tracing::debug!(version = macship::VERSION, "starting macship");

    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        if e.is_relocation() {
            eprintln!("Inspect the planned changes with `macship relocate --dry-run`.");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> macship::Result<()> {
    let (config, config_path) = MacshipConfig::load(cli.config.as_deref())?;
    let ctx = cli::Context::new(config, config_path, cli.workdir);

    match cli.command {
        Commands::Deps(cmd) => cmd.run(&ctx),
        Commands::Build(cmd) => cmd.run(&ctx),
        Commands::Relocate(cmd) => cmd.run(&ctx),
        Commands::Sign(cmd) => cmd.run(&ctx),
        Commands::Notarize(cmd) => cmd.run(&ctx),
        Commands::NotaryStatus(cmd) => cmd.run(&ctx),
        Commands::Staple(cmd) => cmd.run(&ctx),
        Commands::Dmg(cmd) => cmd.run(&ctx),
        Commands::Status(cmd) => cmd.run(&ctx),
        Commands::Config(cmd) => cmd.run(&ctx),
    }
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter; `MACSHIP_LOG_FORMAT=json`
/// switches to JSON lines.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("macship=info"));

    let json = std::env::var("MACSHIP_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_stage_commands() {
        let cli = Cli::parse_from(["macship", "deps", "--arch", "x86_64", "--only", "zlib,boost", "-j", "4"]);
        match cli.command {
            Commands::Deps(cmd) => {
                assert_eq!(cmd.target.arch, Some(macship::Arch::X86_64));
                assert_eq!(cmd.only, vec!["zlib", "boost"]);
                assert_eq!(cmd.jobs, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["macship", "--workdir", "/tmp/w", "notarize", "--no-wait", "--timeout", "30m"]);
        assert_eq!(cli.workdir, Some(PathBuf::from("/tmp/w")));
        match cli.command {
            Commands::Notarize(cmd) => {
                assert!(cmd.no_wait);
                assert_eq!(cmd.timeout, Some(std::time::Duration::from_secs(1800)));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["macship", "dmg", "App.app", "--ignore-unnotarized"]);
        assert!(matches!(cli.command, Commands::Dmg(cmd) if cmd.ignore_unnotarized));

        assert!(Cli::try_parse_from(["macship", "deps", "-j", "0"]).is_err());
        assert!(Cli::try_parse_from(["macship", "build", "--arch", "ppc"]).is_err());
    }
}
