//! Notarize and notary-status command implementations.

use super::{parsers, Context, TargetArgs};
use clap::Args;
use macship::notarize::{self, NotaryCredentials, Notarizer, Verdict};
use macship::pipeline::{self, PipelineState, Stage, Step};
use macship::{Arch, Bundle, Error};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Archive the signed bundle and submit it for notarization.
#[derive(Args, Debug)]
pub struct NotarizeCmd {
    /// Bundle to submit (default: the bundle recorded by `build`).
    #[arg(value_name = "BUNDLE")]
    pub bundle: Option<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Return after the upload; check later with `notary-status`.
    #[arg(long)]
    pub no_wait: bool,

    /// Give up waiting after this long (e.g. "30m").
    #[arg(long, value_parser = parsers::parse_duration)]
    pub timeout: Option<Duration>,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl NotarizeCmd {
    /// Execute the notarize command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch_for_bundle(self.bundle.as_deref(), ctx)?;
        let credentials = NotaryCredentials::from_config(&ctx.config.notarization)?;
        let notarizer = Notarizer::new(credentials, self.timeout);
        let wait = !self.no_wait;

        let verdict = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::Notarize,
            None,
            self.force,
            Some(Stage::Signed),
            |state| {
                let bundle = ctx.open_bundle(self.bundle.as_deref(), state)?;
                let archive = archive_path(ctx, arch, &bundle, state)?;
                notarize::create_archive(&bundle, &archive)?;
                state.archive = Some(archive.clone());

                let verdict = notarizer.submit(&archive, wait)?;
                let reached = record(state, &verdict);
                Ok((verdict, reached))
            },
        )?;

        report(&verdict);
        Ok(())
    }
}

/// Check a submission that was uploaded with `--no-wait`.
#[derive(Args, Debug)]
pub struct NotaryStatusCmd {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Submission id (default: the recorded submission).
    #[arg(long)]
    pub id: Option<String>,

    /// Run even if the pipeline state says otherwise.
    #[arg(long)]
    pub force: bool,
}

impl NotaryStatusCmd {
    /// Execute the notary-status command.
    pub fn run(self, ctx: &Context) -> macship::Result<()> {
        let arch = self.target.arch()?;
        let credentials = NotaryCredentials::from_config(&ctx.config.notarization)?;
        let notarizer = Notarizer::new(credentials, None);

        let verdict = pipeline::run_step(
            &ctx.state_path(arch),
            arch,
            Step::NotaryStatus,
            None,
            self.force,
            None,
            |state| {
                let id = self
                    .id
                    .clone()
                    .or_else(|| state.submission_id.clone())
                    .ok_or_else(|| {
                        Error::State(format!("no submission recorded for {}; pass --id", arch))
                    })?;
                let verdict = notarizer.status(&id)?;
                let reached = record(state, &verdict);
                Ok((verdict, reached))
            },
        )?;

        report(&verdict);
        Ok(())
    }
}

/// `<workdir>/<arch>/<App>-<version>-<arch>.zip`.
fn archive_path(ctx: &Context, arch: Arch, bundle: &Bundle, state: &PipelineState) -> macship::Result<PathBuf> {
    let version = match &state.version {
        Some(version) => version.clone(),
        None => bundle.short_version()?,
    };
    let app = bundle_stem(bundle.root());
    Ok(ctx
        .workdir
        .arch_dir(arch)
        .join(format!("{}-{}-{}.zip", app, version, arch)))
}

fn bundle_stem(bundle: &Path) -> String {
    bundle
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Store the submission id and pick the stage the verdict reaches.
fn record(state: &mut PipelineState, verdict: &Verdict) -> Stage {
    match verdict {
        Verdict::Accepted { id } => {
            state.submission_id = Some(id.clone());
            Stage::Notarized
        }
        Verdict::InProgress { id } => {
            state.submission_id = Some(id.clone());
            Stage::Submitted
        }
    }
}

fn report(verdict: &Verdict) {
    match verdict {
        Verdict::Accepted { id } => println!("Notarization accepted (submission {})", id),
        Verdict::InProgress { id } => println!(
            "Submission {} in progress; check with `macship notary-status`",
            id
        ),
    }
}
