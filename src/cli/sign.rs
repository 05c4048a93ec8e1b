//! Sign command implementation.

use super::{Context, TargetArgs};
use clap::Args;
use macship::pipeline::{self, Stage, Step};
use macship::sign::Signer;
use std::path::PathBuf;

/// Sign the relocated bundle with the hardened runtime.
#[derive(Args, Debug)]
pub struct SignCmd {
    /// Bundle to sign (default: the bundle recorded by `build`).
    #[arg(value_name = "BUNDLE")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Signing identity (default: $MACSHIP_SIGNING_IDENTITY, then signing.identity).
    #[arg(long)]
    pub identity: Option<String>,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl SignCmd {
    /// Execute the sign command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch_for_bundle(self.bundle.as_deref(), ctx)?;
        let signer = Signer::from_config(&ctx.config.signing, self.identity.as_deref())?;

        let bundle = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::Sign,
            None,
            self.force,
            Some(Stage::Relocated),
            |state| {
                let bundle = ctx.open_bundle(self.bundle.as_deref(), state)?;
                signer.sign(&bundle)?;
                Ok((bundle, Stage::Signed))
            },
        )?;

        println!(
            "Signed {} as \"{}\"",
            bundle.root().display(),
            signer.identity()
        );
        Ok(())
    }
}
