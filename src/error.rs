//! Error types for macship.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using macship's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in macship operations.
#[derive(Error, Debug)]
pub enum Error {
    // Build errors
    /// A dependency failed to fetch, configure, build or install.
    #[error("dependency '{name}' failed during {step}: {message}")]
    DependencyBuild {
        /// Dependency name from the configuration.
        name: String,
        /// Pipeline step (fetch, configure, build, install, fixup).
        step: String,
        /// Error message.
        message: String,
    },

    /// The application build failed.
    #[error("application build failed: {0}")]
    AppBuild(String),

    /// Downloaded archive does not match its configured checksum.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// Downloaded file.
        path: PathBuf,
        /// Configured digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    // Bundle errors
    /// Path is not a usable application bundle.
    #[error("invalid bundle {}: {reason}", path.display())]
    InvalidBundle {
        /// Bundle path.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    // Relocation errors
    /// A dependency could not be resolved to a file.
    #[error("unresolvable dependency '{dependency}' of {}", binary.display())]
    MissingDependency {
        /// Binary declaring the dependency.
        binary: PathBuf,
        /// Dependency path as recorded in the load command.
        dependency: String,
    },

    /// Two distinct libraries would land on the same in-bundle path.
    #[error(
        "destination conflict for '{name}': {} and {} are different libraries",
        first.display(),
        second.display()
    )]
    DestinationConflict {
        /// File name inside the bundle's libraries directory.
        name: String,
        /// Library already mapped to that name.
        first: PathBuf,
        /// Library that collides with it.
        second: PathBuf,
    },

    /// The dependency graph loops back on itself.
    #[error("dependency cycle: {}", chain.join(" -> "))]
    DependencyCycle {
        /// Binaries on the cycle, first repeated at the end.
        chain: Vec<String>,
    },

    /// Reading or rewriting a Mach-O binary failed.
    #[error("{}: {source}", path.display())]
    Binary {
        /// Binary being processed.
        path: PathBuf,
        /// Underlying Mach-O error.
        #[source]
        source: macship_macho::MachoError,
    },

    /// Relocation failed for another reason.
    #[error("relocation failed: {0}")]
    Relocation(String),

    // Release errors
    /// Code signing or signature verification failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The notarization service rejected the submission.
    #[error("notarization {status} (submission {id}){}", format_issues(issues))]
    NotarizationRejected {
        /// Submission id.
        id: String,
        /// Verdict reported by the service.
        status: String,
        /// Issues from the submission log.
        issues: Vec<String>,
    },

    /// Talking to the notarization service failed.
    #[error("notarization error: {0}")]
    Notarization(String),

    /// The bundle is not ready to be packaged.
    #[error("bundle is not finalized: {0}")]
    PackagingPrecondition(String),

    /// A stage was invoked before its predecessor completed.
    #[error("'{step}' requires stage {required}, but {arch} is at {current}")]
    StageOrder {
        /// Command being run.
        step: String,
        /// Architecture whose state was checked.
        arch: String,
        /// Minimum stage required.
        required: String,
        /// Recorded stage.
        current: String,
    },

    // Configuration errors
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to load configuration.
    #[error("failed to load config {}: {message}", path.display())]
    ConfigLoad {
        /// Config file.
        path: PathBuf,
        /// Parse or read error.
        message: String,
    },

    /// Failed to read or write the pipeline state record.
    #[error("pipeline state error: {0}")]
    State(String),

    // Command execution errors
    /// Required external tools are not installed.
    #[error("required tools not found in PATH: {}", tools.join(", "))]
    ToolMissing {
        /// Missing executables.
        tools: Vec<String>,
    },

    /// External command failed.
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed.
        command: String,
        /// Error message.
        message: String,
    },

    // IO errors
    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_issues(issues: &[String]) -> String {
    if issues.is_empty() {
        String::new()
    } else {
        format!(":\n  {}", issues.join("\n  "))
    }
}

impl Error {
    /// Create a dependency build error.
    pub fn dependency(
        name: impl Into<String>,
        step: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DependencyBuild {
            name: name.into(),
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a command failed error.
    pub fn command_failed(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a bundle error.
    pub fn invalid_bundle(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Attach the binary path to a Mach-O error.
    pub fn binary(path: impl Into<PathBuf>, source: macship_macho::MachoError) -> Self {
        Self::Binary {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error comes from relocation planning or rewriting.
    pub fn is_relocation(&self) -> bool {
        matches!(
            self,
            Error::MissingDependency { .. }
                | Error::DestinationConflict { .. }
                | Error::DependencyCycle { .. }
                | Error::Binary { .. }
                | Error::Relocation(_)
        )
    }
}
