//! Relocate command implementation.

use super::{Context, TargetArgs};
use clap::Args;
use macship::pipeline::{self, Stage, Step};
use macship::relocate::{RelocateOptions, Relocator};
use std::path::PathBuf;

/// Copy external libraries into the bundle and rewrite its load commands.
#[derive(Args, Debug)]
pub struct RelocateCmd {
    /// Bundle to relocate (default: the bundle recorded by `build`).
    #[arg(value_name = "BUNDLE")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Print the planned copies and edits without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl RelocateCmd {
    /// Execute the relocate command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch_for_bundle(self.bundle.as_deref(), ctx)?;

        let mut search_paths = vec![ctx.workdir.prefix(arch).lib()];
        search_paths.extend(ctx.config.relocation.search_paths.iter().cloned());
        let options = RelocateOptions {
            system_prefixes: ctx.config.relocation.system_prefixes.clone(),
            search_paths,
        };

        if self.dry_run {
            let state = ctx.load_state(arch)?;
            let bundle = ctx.open_bundle(self.bundle.as_deref(), &state)?;
            let plan = Relocator::new(&bundle, options).plan()?;
            if plan.is_empty() {
                println!("{} is already self-contained", bundle.root().display());
            } else {
                print!("{}", plan);
            }
            return Ok(());
        }

        let report = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::Relocate,
            None,
            self.force,
            Some(Stage::AppBuilt),
            |state| {
                let bundle = ctx.open_bundle(self.bundle.as_deref(), state)?;
                let report = Relocator::new(&bundle, options).relocate()?;
                state.bundle = Some(bundle.root().to_path_buf());
                Ok((report, Stage::Relocated))
            },
        )?;

        if report.is_noop() {
            println!("Bundle already self-contained ({} binaries checked)", report.checked);
        } else {
            println!(
                "Copied {} libraries, changed {} references, deleted {} run paths in {} of {} binaries",
                report.copied.len(),
                report.changed_references,
                report.deleted_rpaths,
                report.rewritten,
                report.checked
            );
        }
        Ok(())
    }
}
