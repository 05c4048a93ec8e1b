//! Configuration CLI commands.

use super::Context;
use clap::{Args, Subcommand};
use macship::config::{MacshipConfig, CONFIG_FILE_NAME, EXAMPLE_CONFIG};
use macship::{Error, Result};
use std::path::PathBuf;

/// Configuration commands
#[derive(Subcommand, Debug)]
pub enum ConfigCmd {
    /// Show the effective configuration as TOML.
    Show(ShowCmd),

    /// Print the configuration file in use and the lookup order.
    Path(PathCmd),

    /// Write an annotated example configuration.
    Init(InitCmd),
}

impl ConfigCmd {
    pub fn run(self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCmd::Show(cmd) => cmd.run(ctx),
            ConfigCmd::Path(cmd) => cmd.run(ctx),
            ConfigCmd::Init(cmd) => cmd.run(),
        }
    }
}

/// Show the effective configuration as TOML.
#[derive(Args, Debug)]
pub struct ShowCmd {}

impl ShowCmd {
    pub fn run(self, ctx: &Context) -> Result<()> {
        match &ctx.config_path {
            Some(path) => println!("# {}", path.display()),
            None => println!("# no config file found, showing defaults"),
        }
        print!("{}", ctx.config.to_toml_string()?);
        Ok(())
    }
}

/// Print the configuration file in use and the lookup order.
#[derive(Args, Debug)]
pub struct PathCmd {}

impl PathCmd {
    pub fn run(self, ctx: &Context) -> Result<()> {
        match &ctx.config_path {
            Some(path) => println!("{}", path.display()),
            None => {
                println!("No config file found. Searched:");
                for path in MacshipConfig::search_paths() {
                    println!("  {}", path.display());
                }
            }
        }
        Ok(())
    }
}

/// Write an annotated example configuration.
#[derive(Args, Debug)]
pub struct InitCmd {
    /// Destination (default: ./macship.toml).
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

impl InitCmd {
    pub fn run(self) -> Result<()> {
        let path = self.output.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        write_example(&path, self.force)?;
        println!("Wrote {}", path.display());
        Ok(())
    }
}

fn write_example(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    std::fs::write(path, EXAMPLE_CONFIG)?;
    Ok(())
}
