//! Release pipeline state.
//!
//! Stages run as separate invocations, so the state of each architecture
//! is persisted in `<workdir>/<arch>/pipeline.json`. Every command checks
//! its precondition before doing any work and records its outcome.

use crate::error::{Error, Result};
use crate::target::Arch;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Completed stage, in pipeline order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Nothing built yet.
    #[default]
    Fresh,
    DependenciesBuilt,
    AppBuilt,
    Relocated,
    Signed,
    /// Uploaded, verdict pending.
    Submitted,
    Notarized,
    Stapled,
    Imaged,
}

impl Stage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Fresh => "fresh",
            Stage::DependenciesBuilt => "dependencies_built",
            Stage::AppBuilt => "app_built",
            Stage::Relocated => "relocated",
            Stage::Signed => "signed",
            Stage::Submitted => "submitted",
            Stage::Notarized => "notarized",
            Stage::Stapled => "stapled",
            Stage::Imaged => "imaged",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A command that advances the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Deps,
    Build,
    Relocate,
    Sign,
    Notarize,
    NotaryStatus,
    Staple,
    Dmg,
}

impl Step {
    /// Command name.
    pub fn name(&self) -> &'static str {
        match self {
            Step::Deps => "deps",
            Step::Build => "build",
            Step::Relocate => "relocate",
            Step::Sign => "sign",
            Step::Notarize => "notarize",
            Step::NotaryStatus => "notary-status",
            Step::Staple => "staple",
            Step::Dmg => "dmg",
        }
    }

    /// Earliest stage the step may start from.
    pub fn requires(&self) -> Stage {
        match self {
            Step::Deps => Stage::Fresh,
            Step::Build => Stage::DependenciesBuilt,
            Step::Relocate => Stage::AppBuilt,
            Step::Sign => Stage::Relocated,
            Step::Notarize => Stage::Signed,
            Step::NotaryStatus => Stage::Submitted,
            Step::Staple => Stage::Notarized,
            Step::Dmg => Stage::Stapled,
        }
    }

    /// Stage recorded when the step succeeds.
    pub fn produces(&self) -> Stage {
        match self {
            Step::Deps => Stage::DependenciesBuilt,
            Step::Build => Stage::AppBuilt,
            Step::Relocate => Stage::Relocated,
            Step::Sign => Stage::Signed,
            Step::Notarize | Step::NotaryStatus => Stage::Notarized,
            Step::Staple => Stage::Stapled,
            Step::Dmg => Stage::Imaged,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub step: Step,
    pub from: Stage,
    pub to: Stage,
    /// RFC 3339 timestamp.
    pub at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted state of one architecture's release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub arch: Arch,
    pub stage: Stage,
    /// Application bundle produced by `build`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Archive uploaded for notarization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    /// Pending or last notarization submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    /// Reason of the last failure, cleared on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub history: Vec<Transition>,
}

impl PipelineState {
    pub fn new(arch: Arch) -> Self {
        Self {
            arch,
            stage: Stage::Fresh,
            bundle: None,
            version: None,
            archive: None,
            submission_id: None,
            image: None,
            last_error: None,
            history: Vec::new(),
        }
    }

    /// Load the record, or a fresh state when none exists.
    pub fn load(path: &Path, arch: Arch) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(arch));
        }
        let text = std::fs::read_to_string(path)?;
        let state: Self = serde_json::from_str(&text)
            .map_err(|e| Error::State(format!("{}: {}", path.display(), e)))?;
        if state.arch != arch {
            return Err(Error::State(format!(
                "{} records arch {}, expected {}",
                path.display(),
                state.arch,
                arch
            )));
        }
        Ok(state)
    }

    /// Write the record atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::State(e.to_string()))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Check the step's precondition.
    ///
    /// `accept` widens the required stage for steps with an override
    /// (`dmg --ignore-unnotarized` accepts `Signed`). With `force` a
    /// violated precondition is logged and ignored.
    pub fn check(&self, step: Step, accept: Option<Stage>, force: bool) -> Result<()> {
        let required = accept.unwrap_or_else(|| step.requires());
        if self.stage >= required {
            return Ok(());
        }

        if force {
            tracing::warn!(
                step = %step,
                required = %required,
                current = %self.stage,
                "stage precondition not met, continuing because of --force"
            );
            return Ok(());
        }

        Err(Error::StageOrder {
            step: step.name().to_string(),
            arch: self.arch.to_string(),
            required: required.to_string(),
            current: self.stage.to_string(),
        })
    }

    /// Record a successful step. Re-running an earlier step rewinds.
    pub fn advance(&mut self, step: Step) {
        self.advance_to(step, step.produces());
    }

    /// Record a successful step that ends in a specific stage.
    pub fn advance_to(&mut self, step: Step, to: Stage) {
        let from = self.stage;
        self.history.push(Transition {
            step,
            from,
            to,
            at: now(),
            error: None,
        });
        self.stage = to;
        self.last_error = None;

        // Artifacts of later stages no longer describe the bundle.
        if to < Stage::Submitted {
            self.archive = None;
            self.submission_id = None;
        }
        if to < Stage::Imaged {
            self.image = None;
        }
    }

    /// Record a failed step, rewinding to `rewind_to` when given.
    pub fn fail(&mut self, step: Step, error: &Error, rewind_to: Option<Stage>) {
        let from = self.stage;
        let to = rewind_to.map_or(from, |stage| stage.min(from));
        self.history.push(Transition {
            step,
            from,
            to,
            at: now(),
            error: Some(error.to_string()),
        });
        self.stage = to;
        self.last_error = Some(error.to_string());
    }
}

fn now() -> String {
    humantime::format_rfc3339_seconds(std::time::SystemTime::now()).to_string()
}

/// Load, check, run and record one step.
///
/// The closure runs only when the precondition holds; its result decides
/// the recorded transition. `rewind_on_failure` is the stage recorded when
/// the step fails after it may have modified artifacts.
pub fn run_step<T>(
    state_path: &Path,
    arch: Arch,
    step: Step,
    accept: Option<Stage>,
    force: bool,
    rewind_on_failure: Option<Stage>,
    body: impl FnOnce(&mut PipelineState) -> Result<(T, Stage)>,
) -> Result<T> {
    let mut state = PipelineState::load(state_path, arch)?;
    state.check(step, accept, force)?;

    match body(&mut state) {
        Ok((value, reached)) => {
            state.advance_to(step, reached);
            state.save(state_path)?;
            tracing::debug!(step = %step, stage = %reached, "pipeline advanced");
            Ok(value)
        }
        Err(e) => {
            state.fail(step, &e, rewind_on_failure);
            if let Err(save_err) = state.save(state_path) {
                tracing::warn!(error = %save_err, "failed to record pipeline failure");
            }
            Err(e)
        }
    }
}
