//! Status command implementation.

use super::{parsers, Context};
use clap::Args;
use macship::pipeline::PipelineState;
use macship::{Arch, Error};

/// Show the recorded pipeline state.
#[derive(Args, Debug)]
pub struct StatusCmd {
    /// Only this architecture (default: every recorded one).
    #[arg(long, value_parser = parsers::parse_arch)]
    pub arch: Option<Arch>,

    /// Show the transition history.
    #[arg(short, long)]
    pub verbose: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusCmd {
    /// Execute the status command.
    pub fn run(&self, ctx: &Context) -> macship::Result<()> {
        let archs = match self.arch {
            Some(arch) => vec![arch],
            None => [Arch::X86_64, Arch::Arm64]
                .into_iter()
                .filter(|arch| ctx.state_path(*arch).exists())
                .collect(),
        };
        let states = archs
            .into_iter()
            .map(|arch| ctx.load_state(arch))
            .collect::<macship::Result<Vec<_>>>()?;

        if self.json {
            let json = serde_json::to_string_pretty(&states)
                .map_err(|e| Error::State(e.to_string()))?;
            println!("{}", json);
            return Ok(());
        }

        if states.is_empty() {
            println!("No pipeline state in {}", ctx.workdir.root().display());
            return Ok(());
        }

        println!("{:<8} {:<20} {:<12} {:<40}", "ARCH", "STAGE", "VERSION", "BUNDLE");
        println!("{}", "-".repeat(80));
        for state in &states {
            print_state(state, self.verbose);
        }
        Ok(())
    }
}

fn print_state(state: &PipelineState, verbose: bool) {
    let dash = || "-".to_string();
    println!(
        "{:<8} {:<20} {:<12} {:<40}",
        state.arch,
        state.stage,
        state.version.clone().unwrap_or_else(dash),
        state
            .bundle
            .as_ref()
            .map(|b| b.display().to_string())
            .unwrap_or_else(dash),
    );
    if let Some(id) = &state.submission_id {
        println!("  Submission: {}", id);
    }
    if let Some(image) = &state.image {
        println!("  Image: {}", image.display());
    }
    if let Some(error) = &state.last_error {
        println!("  Last error: {}", error);
    }
    if verbose {
        for t in &state.history {
            let outcome = match &t.error {
                Some(e) => format!("failed: {}", e),
                None => "ok".to_string(),
            };
            println!("  {} {:<14} {} -> {} ({})", t.at, t.step.name(), t.from, t.to, outcome);
        }
    }
}
