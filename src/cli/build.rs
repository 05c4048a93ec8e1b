//! Build command implementation.

use super::{parsers, Context, TargetArgs};
use clap::Args;
use macship::app::AppBuilder;
use macship::pipeline::{self, Stage, Step};
use macship::Error;
use std::path::PathBuf;

/// Build the application bundle against the dependency prefix.
#[derive(Args, Debug)]
pub struct BuildCmd {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Application source directory (default: app.source_dir).
    #[arg(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Version string (default: read from the sources).
    #[arg(long)]
    pub version: Option<String>,

    /// Number of parallel build jobs.
    #[arg(short = 'j', long = "num-jobs", value_parser = parsers::parse_jobs)]
    pub jobs: Option<usize>,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl BuildCmd {
    /// Execute the build command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let target = self.target.target()?;
        let source = self
            .source
            .or_else(|| ctx.config.app.source_dir.clone())
            .ok_or_else(|| Error::config("no application sources; set app.source_dir or pass --source"))?;

        let jobs = self.jobs.unwrap_or_else(parsers::default_jobs);
        let builder = AppBuilder::new(&ctx.config.app, &ctx.workdir, target.clone(), jobs);

        let build = pipeline::run_step(
            &ctx.state_path(target.arch),
            target.arch,
            Step::Build,
            None,
            self.force,
            Some(Stage::DependenciesBuilt),
            |state| {
                let build = builder.build(&source, self.version.as_deref())?;
                state.bundle = Some(build.bundle.clone());
                state.version = Some(build.version.clone());
                Ok((build, Stage::AppBuilt))
            },
        )?;

        println!(
            "Built {} {} for {}: {}",
            ctx.config.app.name,
            build.version,
            target.arch,
            build.bundle.display()
        );
        Ok(())
    }
}
