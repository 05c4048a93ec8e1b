//! Code signing.

use crate::bundle::Bundle;
use crate::config::SigningConfig;
use crate::error::{Error, Result};
use crate::tool;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable overriding the configured identity.
pub const IDENTITY_ENV: &str = "MACSHIP_SIGNING_IDENTITY";

/// Signs bundles with a Developer ID identity.
#[derive(Debug, Clone)]
pub struct Signer {
    identity: String,
    entitlements: Option<PathBuf>,
}

impl Signer {
    pub fn new(identity: impl Into<String>, entitlements: Option<PathBuf>) -> Self {
        Self {
            identity: identity.into(),
            entitlements,
        }
    }

    /// Identity from `explicit`, then the environment, then configuration.
    pub fn from_config(config: &SigningConfig, explicit: Option<&str>) -> Result<Self> {
        let identity = explicit
            .map(str::to_string)
            .or_else(|| std::env::var(IDENTITY_ENV).ok().filter(|v| !v.is_empty()))
            .or_else(|| config.identity.clone())
            .ok_or_else(|| {
                Error::Signing(format!(
                    "no signing identity; set signing.identity, {} or pass --identity",
                    IDENTITY_ENV
                ))
            })?;
        Ok(Self::new(identity, config.entitlements.clone()))
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sign the bundle with the hardened runtime and a secure timestamp,
    /// then verify the signature.
    pub fn sign(&self, bundle: &Bundle) -> Result<()> {
        tool::require(&["codesign"])?;
        if let Some(entitlements) = &self.entitlements {
            if !entitlements.is_file() {
                return Err(Error::Signing(format!(
                    "entitlements file {} not found",
                    entitlements.display()
                )));
            }
        }

        tracing::info!(bundle = %bundle.root().display(), identity = %self.identity, "signing");
        tool::output(&mut self.sign_command(bundle.root()))
            .map_err(|e| Error::Signing(e.to_string()))?;

        let verify = tool::output(&mut verify_command(bundle.root()))
            .map_err(|e| Error::Signing(format!("signature verification failed: {}", e)))?;
        tracing::debug!(
            output = %String::from_utf8_lossy(&verify.stderr).trim(),
            "signature verified"
        );
        Ok(())
    }

    pub fn sign_command(&self, bundle: &Path) -> Command {
        let mut cmd = Command::new("codesign");
        cmd.args(["--force", "--deep", "--options=runtime", "--timestamp"]);
        if let Some(entitlements) = &self.entitlements {
            cmd.arg("--entitlements").arg(entitlements);
        }
        cmd.arg("--sign").arg(&self.identity).arg(bundle);
        cmd
    }
}

pub fn verify_command(bundle: &Path) -> Command {
    let mut cmd = Command::new("codesign");
    cmd.args(["--verify", "--deep", "--strict", "-vvv"]).arg(bundle);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::build_system::args_of;

    #[test]
    fn test_sign_command() {
        let signer = Signer::new("Developer ID Application: Example (TEAM123456)", None);
        let cmd = signer.sign_command(Path::new("/w/arm64/App-1.0/App.app"));
        assert_eq!(cmd.get_program(), "codesign");
        assert_eq!(
            args_of(&cmd),
            vec![
                "--force",
                "--deep",
                "--options=runtime",
                "--timestamp",
                "--sign",
                "Developer ID Application: Example (TEAM123456)",
                "/w/arm64/App-1.0/App.app",
            ]
        );
    }

    #[test]
    fn test_sign_command_with_entitlements() {
        let signer = Signer::new("-", Some(PathBuf::from("/cfg/app.entitlements")));
        let args = args_of(&signer.sign_command(Path::new("/b/App.app")));
        let at = args.iter().position(|a| a == "--entitlements").unwrap();
        assert_eq!(args[at + 1], "/cfg/app.entitlements");
        assert!(at < args.iter().position(|a| a == "--sign").unwrap());
    }

    #[test]
    fn test_verify_command() {
        assert_eq!(
            args_of(&verify_command(Path::new("/b/App.app"))),
            vec!["--verify", "--deep", "--strict", "-vvv", "/b/App.app"]
        );
    }

    #[test]
    fn test_identity_resolution() {
        let config = SigningConfig {
            identity: Some("Developer ID Application: Configured".into()),
            entitlements: None,
        };
        let signer = Signer::from_config(&config, Some("Explicit")).unwrap();
        assert_eq!(signer.identity(), "Explicit");

        if std::env::var_os(IDENTITY_ENV).is_none() {
            let signer = Signer::from_config(&config, None).unwrap();
            assert_eq!(signer.identity(), "Developer ID Application: Configured");
            assert!(Signer::from_config(&SigningConfig::default(), None).is_err());
        }
    }
}
