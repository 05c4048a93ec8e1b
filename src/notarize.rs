//! Notarization and stapling.
//!
//! The signed bundle is archived with `ditto` and uploaded with
//! `xcrun notarytool`. Verdicts are read from notarytool's JSON output;
//! a rejection fetches the submission log so its issues reach the
//! operator verbatim.

use crate::bundle::Bundle;
use crate::config::NotarizationConfig;
use crate::error::{Error, Result};
use crate::tool;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Credentials passed to notarytool.
#[derive(Clone, PartialEq, Eq)]
pub enum NotaryCredentials {
    /// Profile stored with `notarytool store-credentials`.
    KeychainProfile(String),
    AppleId {
        apple_id: String,
        team_id: String,
        password: String,
    },
}

impl std::fmt::Debug for NotaryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeychainProfile(profile) => f.debug_tuple("KeychainProfile").field(profile).finish(),
            Self::AppleId {
                apple_id, team_id, ..
            } => f
                .debug_struct("AppleId")
                .field("apple_id", apple_id)
                .field("team_id", team_id)
                .finish_non_exhaustive(),
        }
    }
}

impl NotaryCredentials {
    /// Credentials from configuration; the password comes from the
    /// configured environment variable.
    pub fn from_config(config: &NotarizationConfig) -> Result<Self> {
        if let Some(profile) = &config.keychain_profile {
            return Ok(Self::KeychainProfile(profile.clone()));
        }

        match (&config.apple_id, &config.team_id) {
            (Some(apple_id), Some(team_id)) => {
                let password = std::env::var(&config.password_env).map_err(|_| {
                    Error::Notarization(format!(
                        "app-specific password not set; export {}",
                        config.password_env
                    ))
                })?;
                Ok(Self::AppleId {
                    apple_id: apple_id.clone(),
                    team_id: team_id.clone(),
                    password,
                })
            }
            _ => Err(Error::Notarization(
                "no credentials; set notarization.keychain_profile or apple_id and team_id"
                    .to_string(),
            )),
        }
    }

    fn apply(&self, cmd: &mut Command) {
        match self {
            Self::KeychainProfile(profile) => {
                cmd.arg("--keychain-profile").arg(profile);
            }
            Self::AppleId {
                apple_id,
                team_id,
                password,
            } => {
                cmd.arg("--apple-id")
                    .arg(apple_id)
                    .arg("--team-id")
                    .arg(team_id)
                    .arg("--password")
                    .arg(password);
            }
        }
    }
}

/// Response of `notarytool submit` and `notarytool info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Submission {
    pub id: String,
    /// Absent when submitting without waiting.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Submission log from `notarytool log`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaryLog {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_summary: Option<String>,
    /// `null` when the log has no issues.
    #[serde(default)]
    pub issues: Option<Vec<NotaryIssue>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaryIssue {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    pub message: String,
    #[serde(default)]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
}

impl std::fmt::Display for NotaryIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "[{}] ", severity)?;
        }
        if let Some(path) = &self.path {
            write!(f, "{}", path)?;
            if let Some(arch) = &self.architecture {
                write!(f, " ({})", arch)?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(url) = &self.doc_url {
            write!(f, " <{}>", url)?;
        }
        Ok(())
    }
}

/// Outcome of a submission that was not rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted { id: String },
    InProgress { id: String },
}

/// Talks to the notarization service.
#[derive(Debug, Clone)]
pub struct Notarizer {
    credentials: NotaryCredentials,
    timeout: Option<Duration>,
}

impl Notarizer {
    pub fn new(credentials: NotaryCredentials, timeout: Option<Duration>) -> Self {
        Self {
            credentials,
            timeout,
        }
    }

    /// Upload `archive`; with `wait`, block until the service decides.
    pub fn submit(&self, archive: &Path, wait: bool) -> Result<Verdict> {
        tool::require(&["xcrun"])?;
        tracing::info!(archive = %archive.display(), wait, "submitting for notarization");
        let submission = self.run_json::<Submission>(&mut self.submit_command(archive, wait))?;
        tracing::info!(id = %submission.id, status = ?submission.status, "submission recorded");
        self.settle(submission)
    }

    /// Current verdict of a recorded submission.
    pub fn status(&self, id: &str) -> Result<Verdict> {
        tool::require(&["xcrun"])?;
        let submission = self.run_json::<Submission>(&mut self.info_command(id))?;
        self.settle(submission)
    }

    /// Turn a submission into a verdict, fetching the log on rejection.
    fn settle(&self, submission: Submission) -> Result<Verdict> {
        match parse_status(submission.status.as_deref())? {
            Status::Accepted => Ok(Verdict::Accepted { id: submission.id }),
            Status::InProgress => Ok(Verdict::InProgress { id: submission.id }),
            Status::Rejected(status) => {
                let log = match self.run_json::<NotaryLog>(&mut self.log_command(&submission.id)) {
                    Ok(log) => log,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not fetch notarization log");
                        NotaryLog::default()
                    }
                };
                Err(rejection(&submission, status, &log))
            }
        }
    }

    fn run_json<T: serde::de::DeserializeOwned>(&self, cmd: &mut Command) -> Result<T> {
        let output = tool::capture(cmd)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        match serde_json::from_str(stdout.trim()) {
            Ok(value) => Ok(value),
            Err(parse_err) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let detail = if output.status.success() {
                    format!("unexpected notarytool output ({}): {}", parse_err, stdout.trim())
                } else {
                    format!("{}: {}", tool::display(cmd), stderr.trim())
                };
                Err(Error::Notarization(detail))
            }
        }
    }

    fn notarytool(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new("xcrun");
        cmd.arg("notarytool").arg(subcommand);
        cmd
    }

    pub fn submit_command(&self, archive: &Path, wait: bool) -> Command {
        let mut cmd = self.notarytool("submit");
        cmd.arg(archive);
        self.credentials.apply(&mut cmd);
        cmd.args(["--output-format", "json"]);
        if wait {
            cmd.arg("--wait");
            if let Some(timeout) = self.timeout {
                cmd.arg("--timeout").arg(format!("{}s", timeout.as_secs().max(1)));
            }
        }
        cmd
    }

    pub fn info_command(&self, id: &str) -> Command {
        let mut cmd = self.notarytool("info");
        cmd.arg(id);
        self.credentials.apply(&mut cmd);
        cmd.args(["--output-format", "json"]);
        cmd
    }

    pub fn log_command(&self, id: &str) -> Command {
        let mut cmd = self.notarytool("log");
        cmd.arg(id);
        self.credentials.apply(&mut cmd);
        cmd
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Status {
    Accepted,
    InProgress,
    Rejected(String),
}

fn parse_status(status: Option<&str>) -> Result<Status> {
    match status {
        // Uploads without --wait report no status yet.
        None => Ok(Status::InProgress),
        Some("Accepted") => Ok(Status::Accepted),
        Some("In Progress") => Ok(Status::InProgress),
        Some(s @ ("Invalid" | "Rejected")) => Ok(Status::Rejected(s.to_string())),
        Some(other) => Err(Error::Notarization(format!(
            "unknown submission status '{}'",
            other
        ))),
    }
}

fn rejection(submission: &Submission, status: String, log: &NotaryLog) -> Error {
    let mut issues: Vec<String> = log
        .issues
        .iter()
        .flatten()
        .map(ToString::to_string)
        .collect();
    if issues.is_empty() {
        if let Some(summary) = log.status_summary.as_ref().or(submission.message.as_ref()) {
            issues.push(summary.clone());
        }
    }
    Error::NotarizationRejected {
        id: submission.id.clone(),
        status,
        issues,
    }
}

/// `ditto` invocation producing the upload archive.
pub fn archive_command(bundle: &Path, archive: &Path) -> Command {
    let mut cmd = Command::new("ditto");
    cmd.args(["-c", "-k", "--sequesterRsrc", "--keepParent"])
        .arg(bundle)
        .arg(archive);
    cmd
}

/// Archive the bundle for upload, replacing a stale archive.
pub fn create_archive(bundle: &Bundle, archive: &Path) -> Result<()> {
    tool::require(&["ditto"])?;
    if archive.exists() {
        std::fs::remove_file(archive)?;
    }
    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent)?;
    }
    tool::output(&mut archive_command(bundle.root(), archive))?;
    tracing::info!(archive = %archive.display(), "archived bundle");
    Ok(())
}

/// Staple the notarization ticket and validate it.
pub fn staple(bundle: &Bundle) -> Result<()> {
    tool::require(&["xcrun"])?;
    for action in ["staple", "validate"] {
        let mut cmd = stapler_command(action, bundle.root());
        tool::output(&mut cmd).map_err(|e| Error::Notarization(e.to_string()))?;
    }
    tracing::info!(bundle = %bundle.root().display(), "ticket stapled");
    Ok(())
}

pub fn stapler_command(action: &str, bundle: &Path) -> Command {
    let mut cmd = Command::new("xcrun");
    cmd.arg("stapler").arg(action).arg(bundle);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::build_system::args_of;

    fn profile() -> Notarizer {
        Notarizer::new(
            NotaryCredentials::KeychainProfile("macship-notary".into()),
            Some(Duration::from_secs(2 * 3600)),
        )
    }

    #[test]
    fn test_submit_command() {
        let cmd = profile().submit_command(Path::new("/w/arm64/App-1.0-arm64.zip"), true);
        assert_eq!(cmd.get_program(), "xcrun");
        assert_eq!(
            args_of(&cmd),
            vec![
                "notarytool",
                "submit",
                "/w/arm64/App-1.0-arm64.zip",
                "--keychain-profile",
                "macship-notary",
                "--output-format",
                "json",
                "--wait",
                "--timeout",
                "7200s",
            ]
        );

        let no_wait = args_of(&profile().submit_command(Path::new("/a.zip"), false));
        assert!(!no_wait.contains(&"--wait".to_string()));
        assert!(!no_wait.contains(&"--timeout".to_string()));
    }

    #[test]
    fn test_apple_id_credentials() {
        let notarizer = Notarizer::new(
            NotaryCredentials::AppleId {
                apple_id: "dev@example.com".into(),
                team_id: "TEAM123456".into(),
                password: "abcd-efgh".into(),
            },
            None,
        );
        let cmd = notarizer.info_command("4a2b");
        let args = args_of(&cmd);
        assert_eq!(&args[..3], &["notarytool", "info", "4a2b"]);
        assert!(args.windows(2).any(|w| w == ["--apple-id", "dev@example.com"]));
        assert!(args.windows(2).any(|w| w == ["--team-id", "TEAM123456"]));
        assert!(!tool::display(&cmd).contains("abcd-efgh"));
        assert!(!format!("{:?}", notarizer).contains("abcd-efgh"));
    }

    #[test]
    fn test_credentials_from_config() {
        let config = NotarizationConfig {
            keychain_profile: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(
            NotaryCredentials::from_config(&config).unwrap(),
            NotaryCredentials::KeychainProfile("p".into())
        );

        let config = NotarizationConfig {
            apple_id: Some("dev@example.com".into()),
            team_id: Some("TEAM123456".into()),
            password_env: "MACSHIP_TEST_PASSWORD_THAT_IS_NOT_SET".into(),
            ..Default::default()
        };
        let err = NotaryCredentials::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("MACSHIP_TEST_PASSWORD_THAT_IS_NOT_SET"));

        assert!(NotaryCredentials::from_config(&NotarizationConfig::default()).is_err());
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(Some("Accepted")).unwrap(), Status::Accepted);
        assert_eq!(parse_status(Some("In Progress")).unwrap(), Status::InProgress);
        assert_eq!(parse_status(None).unwrap(), Status::InProgress);
        assert_eq!(
            parse_status(Some("Invalid")).unwrap(),
            Status::Rejected("Invalid".into())
        );
        assert!(parse_status(Some("Exploded")).is_err());
    }

    #[test]
    fn test_parse_responses() {
        let submitted: Submission = serde_json::from_str(
            r#"{"id":"2efe2717-52ef-43a5-96dc-0797e4ca1041","message":"Successfully uploaded file","path":"/w/a.zip"}"#,
        )
        .unwrap();
        assert_eq!(submitted.status, None);

        let done: Submission = serde_json::from_str(
            r#"{"id":"2efe2717","status":"Accepted","message":"Processing complete","createdDate":"2026-01-01T00:00:00Z","name":"a.zip"}"#,
        )
        .unwrap();
        assert_eq!(done.status.as_deref(), Some("Accepted"));
    }

    #[test]
    fn test_rejection_carries_log_issues() {
        let log: NotaryLog = serde_json::from_str(
            r#"{
                "logFormatVersion": 1,
                "jobId": "2efe2717",
                "status": "Invalid",
                "statusSummary": "Archive contains critical validation errors",
                "issues": [
                    {
                        "severity": "error",
                        "code": null,
                        "path": "App-1.0-arm64.zip/App.app/Contents/Frameworks/libgdal.30.dylib",
                        "message": "The binary is not signed with a valid Developer ID certificate.",
                        "docUrl": "https://developer.apple.com/documentation/security",
                        "architecture": "arm64"
                    }
                ]
            }"#,
        )
        .unwrap();
        let submission = Submission {
            id: "2efe2717".into(),
            status: Some("Invalid".into()),
            message: None,
        };

        let err = rejection(&submission, "Invalid".into(), &log);
        let msg = err.to_string();
        assert!(msg.contains("Invalid"));
        assert!(msg.contains("libgdal.30.dylib (arm64)"));
        assert!(msg.contains("not signed with a valid Developer ID"));

        let empty: NotaryLog =
            serde_json::from_str(r#"{"status":"Invalid","statusSummary":"Bad archive","issues":null}"#)
                .unwrap();
        let err = rejection(&submission, "Invalid".into(), &empty);
        assert!(err.to_string().contains("Bad archive"));
    }

    #[test]
    fn test_archive_and_stapler_commands() {
        let cmd = archive_command(Path::new("/b/App.app"), Path::new("/w/App-1.0-arm64.zip"));
        assert_eq!(cmd.get_program(), "ditto");
        assert_eq!(
            args_of(&cmd),
            vec![
                "-c",
                "-k",
                "--sequesterRsrc",
                "--keepParent",
                "/b/App.app",
                "/w/App-1.0-arm64.zip"
            ]
        );
        assert_eq!(
            args_of(&stapler_command("validate", Path::new("/b/App.app"))),
            vec!["stapler", "validate", "/b/App.app"]
        );
    }
}
