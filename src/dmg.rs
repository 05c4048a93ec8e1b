//! Disk image packaging.

use crate::bundle::Bundle;
use crate::config::DmgConfig;
use crate::error::{Error, Result};
use crate::target::Arch;
use crate::tool;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Check that the bundle is signed, stapled and accepted by Gatekeeper.
pub fn check_finalized(bundle: &Bundle) -> Result<()> {
    if !bundle.has_signature() {
        return Err(Error::PackagingPrecondition(format!(
            "{} has no code signature; run `macship sign`",
            bundle.root().display()
        )));
    }
    if !bundle.has_stapled_ticket() {
        return Err(Error::PackagingPrecondition(format!(
            "{} has no stapled ticket; run `macship staple`",
            bundle.root().display()
        )));
    }

    tool::require(&["spctl"])?;
    let output = tool::capture(&mut assessment_command(bundle.root()))?;
    let report = String::from_utf8_lossy(&output.stderr);
    tracing::debug!(report = %report.trim(), "gatekeeper assessment");
    if !is_accepted(&report) {
        return Err(Error::PackagingPrecondition(format!(
            "Gatekeeper did not accept {}: {}",
            bundle.root().display(),
            report.trim()
        )));
    }
    Ok(())
}

pub fn assessment_command(bundle: &Path) -> Command {
    let mut cmd = Command::new("spctl");
    cmd.args(["-a", "-vvv"]).arg(bundle);
    cmd
}

/// `spctl` reports `<path>: accepted` for a notarized bundle.
fn is_accepted(report: &str) -> bool {
    report
        .lines()
        .any(|line| line.trim_end().ends_with(": accepted") || line.trim() == "accepted")
}

/// `<App>-<version>-<arch>.dmg`, prefixed for unnotarized images.
pub fn image_name(app: &str, version: &str, arch: Arch, notarized: bool) -> String {
    let prefix = if notarized { "" } else { "unnotarized-" };
    format!("{}{}-{}-{}.dmg", prefix, app, version, arch)
}

/// Expand `{app}`, `{version}` and `{arch}` in the volume name.
pub fn volume_name(template: &str, app: &str, version: &str, arch: Arch) -> String {
    template
        .replace("{app}", app)
        .replace("{version}", version)
        .replace("{arch}", arch.as_str())
}

/// Builds disk images with `create-dmg`.
#[derive(Debug, Clone)]
pub struct ImageBuilder<'a> {
    config: &'a DmgConfig,
    /// Base for relative background and EULA paths.
    config_dir: PathBuf,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(config: &'a DmgConfig, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            config_dir: config_dir.into(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Package the folder holding `bundle` into `image`.
    pub fn create(&self, bundle: &Bundle, app: &str, version: &str, arch: Arch, image: &Path) -> Result<()> {
        tool::require(&["create-dmg"])?;
        for asset in [&self.config.background, &self.config.eula].into_iter().flatten() {
            let asset = self.resolve(asset);
            if !asset.is_file() {
                return Err(Error::config(format!("dmg asset {} not found", asset.display())));
            }
        }

        if image.exists() {
            tracing::info!(image = %image.display(), "removing stale image");
            std::fs::remove_file(image)?;
        }
        if let Some(parent) = image.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let source = bundle.root().parent().ok_or_else(|| {
            Error::invalid_bundle(bundle.root(), "bundle has no parent directory")
        })?;
        let mut cmd = self.command(&bundle.file_name(), app, version, arch, image, source);
        tool::output(&mut cmd)?;
        tracing::info!(image = %image.display(), "disk image created");
        Ok(())
    }

    pub fn command(
        &self,
        bundle_name: &str,
        app: &str,
        version: &str,
        arch: Arch,
        image: &Path,
        source: &Path,
    ) -> Command {
        let config = self.config;
        let pair = |[x, y]: [u32; 2]| [x.to_string(), y.to_string()];

        let mut cmd = Command::new("create-dmg");
        cmd.arg("--volname")
            .arg(volume_name(&config.volume_name, app, version, arch));
        if let Some(background) = &config.background {
            cmd.arg("--background").arg(self.resolve(background));
        }
        cmd.arg("--window-pos").args(pair(config.window_pos));
        cmd.arg("--window-size").args(pair(config.window_size));
        cmd.arg("--icon-size").arg(config.icon_size.to_string());
        cmd.arg("--icon").arg(bundle_name).args(pair(config.app_icon));
        for icon in &config.icons {
            cmd.arg("--icon").arg(&icon.name).args(pair(icon.position));
        }
        if let Some(eula) = &config.eula {
            cmd.arg("--eula").arg(self.resolve(eula));
        }
        cmd.arg("--app-drop-link").args(pair(config.app_drop_link));
        cmd.arg(image).arg(source);
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::make_bundle;
    use crate::config::{DmgIcon, MacshipConfig};
    use crate::deps::build_system::args_of;
    use macship_macho::fixture::FixtureBuilder;

    #[test]
    fn test_image_name() {
        assert_eq!(
            image_name("CloudCompare", "2.12.0", Arch::Arm64, true),
            "CloudCompare-2.12.0-arm64.dmg"
        );
        assert_eq!(
            image_name("CloudCompare", "2.12.0", Arch::X86_64, false),
            "unnotarized-CloudCompare-2.12.0-x86_64.dmg"
        );
    }

    #[test]
    fn test_is_accepted() {
        assert!(is_accepted(
            "/b/App.app: accepted\nsource=Notarized Developer ID\norigin=Developer ID Application: X\n"
        ));
        assert!(!is_accepted("/b/App.app: rejected\nsource=Unnotarized Developer ID\n"));
        assert!(!is_accepted("/b/App.app: a sealed resource is missing or invalid\n"));
    }

    #[test]
    fn test_create_dmg_command() {
        let config = MacshipConfig::from_toml_str(crate::config::EXAMPLE_CONFIG).unwrap();
        let builder = ImageBuilder::new(&config.dmg, "/repo");
        let cmd = builder.command(
            "CloudCompare.app",
            "CloudCompare",
            "2.12.0",
            Arch::Arm64,
            Path::new("/w/arm64/CloudCompare-2.12.0-arm64.dmg"),
            Path::new("/w/arm64/CloudCompare-2.12.0/CloudCompare"),
        );
        assert_eq!(cmd.get_program(), "create-dmg");
        assert_eq!(
            args_of(&cmd),
            vec![
                "--volname",
                "CloudCompare 2.12.0 arm64",
                "--background",
                "/repo/assets/cc_background.png",
                "--window-pos",
                "200",
                "120",
                "--window-size",
                "800",
                "400",
                "--icon-size",
                "100",
                "--icon",
                "CloudCompare.app",
                "200",
                "100",
                "--icon",
                "CHANGELOG.md",
                "350",
                "100",
                "--icon",
                "global_shift_list_template.txt",
                "200",
                "260",
                "--icon",
                "license.txt",
                "350",
                "260",
                "--eula",
                "/repo/assets/GPLv3.txt",
                "--app-drop-link",
                "600",
                "185",
                "/w/arm64/CloudCompare-2.12.0-arm64.dmg",
                "/w/arm64/CloudCompare-2.12.0/CloudCompare",
            ]
        );
    }

    #[test]
    fn test_minimal_layout_omits_optional_assets() {
        let config = DmgConfig {
            icons: vec![DmgIcon {
                name: "README.txt".into(),
                position: [1, 2],
            }],
            ..Default::default()
        };
        let builder = ImageBuilder::new(&config, "/repo");
        let args = args_of(&builder.command(
            "Viewer.app",
            "Viewer",
            "1.0",
            Arch::X86_64,
            Path::new("/o.dmg"),
            Path::new("/src"),
        ));
        assert_eq!(args[1], "Viewer 1.0 x86_64");
        assert!(!args.contains(&"--background".to_string()));
        assert!(!args.contains(&"--eula".to_string()));
        assert!(args.windows(3).any(|w| w == ["README.txt", "1", "2"]));
    }

    #[test]
    fn test_unsigned_bundle_is_not_finalized() {
        let dir = tempfile::tempdir().unwrap();
        let root = make_bundle(dir.path(), &FixtureBuilder::executable());
        let bundle = Bundle::open(&root, None, "PlugIns").unwrap();

        let err = check_finalized(&bundle).unwrap_err();
        assert!(matches!(err, Error::PackagingPrecondition(_)));
        assert!(err.to_string().contains("signature"));

        std::fs::create_dir_all(root.join("Contents/_CodeSignature")).unwrap();
        std::fs::write(root.join("Contents/_CodeSignature/CodeResources"), b"").unwrap();
        let err = check_finalized(&bundle).unwrap_err();
        assert!(err.to_string().contains("stapled"));
    }
}
