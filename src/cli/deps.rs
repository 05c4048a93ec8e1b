//! Deps command implementation.

use super::{parsers, Context, TargetArgs};
use clap::Args;
use macship::deps::DependencyBuilder;
use macship::pipeline::{self, Stage, Step};

/// Build the configured third-party dependencies into the install prefix.
#[derive(Args, Debug)]
pub struct DepsCmd {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only build these dependencies (comma separated, configured order).
    #[arg(long, value_delimiter = ',', value_name = "NAME")]
    pub only: Vec<String>,

    /// Number of parallel build jobs.
    #[arg(short = 'j', long = "num-jobs", value_parser = parsers::parse_jobs)]
    pub jobs: Option<usize>,

    /// List the dependencies that would be built and exit.
    #[arg(long)]
    pub list: bool,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl DepsCmd {
    /// Execute the deps command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let target = self.target.target()?;
        let selected = ctx.config.select_dependencies(&self.only)?;

        if self.list {
            for dep in &selected {
                println!("{}", dep.name);
            }
            return Ok(());
        }
        if selected.is_empty() {
            println!("No dependencies configured");
        }

        let jobs = self.jobs.unwrap_or_else(parsers::default_jobs);
        let builder = DependencyBuilder::new(&ctx.workdir, target.clone(), jobs);
        // Post-install fixups reference every library; run them on full builds.
        let post_install = if self.only.is_empty() {
            ctx.config.post_install.as_slice()
        } else {
            &[]
        };

        let report = pipeline::run_step(
            &ctx.state_path(target.arch),
            target.arch,
            Step::Deps,
            None,
            self.force,
            None,
            |_| {
                let report = builder.build_all(&selected, post_install)?;
                Ok((report, Stage::DependenciesBuilt))
            },
        )?;

        println!(
            "Built {} dependencies for {} (macOS {}) into {}",
            report.built.len(),
            target.arch,
            target.min_macos,
            ctx.workdir.prefix(target.arch).root().display()
        );
        if report.fixed > 0 {
            println!("Fixed load paths in {} libraries", report.fixed);
        }
        Ok(())
    }
}
