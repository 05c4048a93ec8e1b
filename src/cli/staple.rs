//! Staple command implementation.

use super::{Context, TargetArgs};
use clap::Args;
use macship::notarize;
use macship::pipeline::{self, Stage, Step};
use std::path::PathBuf;

/// Attach the notarization ticket to the bundle.
#[derive(Args, Debug)]
pub struct StapleCmd {
    /// Bundle to staple (default: the bundle recorded by `build`).
    #[arg(value_name = "BUNDLE")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl StapleCmd {
    /// Execute the staple command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch_for_bundle(self.bundle.as_deref(), ctx)?;

        let bundle = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::Staple,
            None,
            self.force,
            None,
            |state| {
                let bundle = ctx.open_bundle(self.bundle.as_deref(), state)?;
                notarize::staple(&bundle)?;
                Ok((bundle, Stage::Stapled))
            },
        )?;

        println!("Stapled {}", bundle.root().display());
        Ok(())
    }
}
