//! Dmg command implementation.

use super::{Context, TargetArgs};
use clap::Args;
use macship::dmg::{self, ImageBuilder};
use macship::pipeline::{self, Stage, Step};
use std::path::PathBuf;

/// Package the finalized bundle into a disk image.
#[derive(Args, Debug)]
pub struct DmgCmd {
    /// Bundle to package (default: the bundle recorded by `build`).
    #[arg(value_name = "BUNDLE")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Package a signed but unnotarized bundle. The image name gets an
    /// `unnotarized-` prefix.
    #[arg(long)]
    pub ignore_unnotarized: bool,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl DmgCmd {
    /// Execute the dmg command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch_for_bundle(self.bundle.as_deref(), ctx)?;
        let accept = self.ignore_unnotarized.then_some(Stage::Signed);
        let builder = ImageBuilder::new(&ctx.config.dmg, ctx.config_dir());

        let image = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::Dmg,
            accept,
            self.force,
            None,
            |state| {
                let bundle = ctx.open_bundle(self.bundle.as_deref(), state)?;
                let notarized = !self.ignore_unnotarized;
                if notarized {
                    dmg::check_finalized(&bundle)?;
                }

                let version = match &state.version {
                    Some(version) => version.clone(),
                    None => bundle.short_version()?,
                };
                let app = bundle
                    .root()
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ctx.config.app.name.clone());
                let image = ctx
                    .workdir
                    .arch_dir(arch)
                    .join(dmg::image_name(&app, &version, arch, notarized));

                builder.create(&bundle, &app, &version, arch, &image)?;
                state.image = Some(image.clone());
                Ok((image, Stage::Imaged))
            },
        )?;

        println!("Created {}", image.display());
        Ok(())
    }
}
