//! macship configuration.
//!
//! The dependency list, application build options and release settings are
//! data read from `macship.toml`. A missing file yields the built-in
//! defaults, which describe an application without dependencies.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Application name for config file storage.
const APP_NAME: &str = "macship";

/// Config file name looked up in the current directory and config dir.
pub const CONFIG_FILE_NAME: &str = "macship.toml";

/// Annotated configuration written by `macship config init`.
pub const EXAMPLE_CONFIG: &str = include_str!("../macship.example.toml");

/// Environment variable read for the notary password when no keychain
/// profile is configured.
const DEFAULT_PASSWORD_ENV: &str = "MACSHIP_NOTARY_PASSWORD";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MacshipConfig {
    /// Work directory, relative to the current directory.
    pub workdir: PathBuf,

    pub app: AppConfig,

    /// Third-party libraries, built in order.
    #[serde(rename = "dependency")]
    pub dependencies: Vec<DependencySpec>,

    /// Load path fixups applied to prefix libraries after all
    /// dependencies are installed.
    pub post_install: Vec<LoadPathFixup>,

    pub relocation: RelocationConfig,
    pub signing: SigningConfig,
    pub notarization: NotarizationConfig,
    pub dmg: DmgConfig,
}

impl Default for MacshipConfig {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("workdir"),
            app: AppConfig::default(),
            dependencies: Vec::new(),
            post_install: Vec::new(),
            relocation: RelocationConfig::default(),
            signing: SigningConfig::default(),
            notarization: NotarizationConfig::default(),
            dmg: DmgConfig::default(),
        }
    }
}

impl MacshipConfig {
    /// Load configuration.
    ///
    /// Lookup order: `explicit`, then `./macship.toml`, then the user
    /// config directory. Returns the defaults and `None` when no file
    /// exists; an explicit path that does not exist is an error.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::ConfigLoad {
                    path: path.to_path_buf(),
                    message: "file does not exist".into(),
                });
            }
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }

        for candidate in Self::search_paths() {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "loading config");
                return Ok((Self::from_file(&candidate)?, Some(candidate)));
            }
        }

        Ok((Self::default(), None))
    }

    /// Candidate config file locations, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join(APP_NAME).join(CONFIG_FILE_NAME));
        }
        paths
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&text).map_err(|e| Error::ConfigLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for dep in &self.dependencies {
            if dep.name.is_empty() {
                return Err(Error::config("dependency with empty name"));
            }
            if dep.name.contains('/') {
                return Err(Error::config(format!(
                    "dependency name '{}' must not contain '/'",
                    dep.name
                )));
            }
            if !seen.insert(dep.name.as_str()) {
                return Err(Error::config(format!(
                    "dependency '{}' is listed twice",
                    dep.name
                )));
            }
            if let SourceSpec::Archive {
                sha256: Some(digest),
                ..
            } = &dep.source
            {
                let hex = digest.strip_prefix("sha256:").unwrap_or(digest);
                if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(Error::config(format!(
                        "dependency '{}': sha256 must be 64 hex digits",
                        dep.name
                    )));
                }
            }
        }

        if self.app.name.is_empty() {
            return Err(Error::config("app.name must not be empty"));
        }
        if self.notarization.keychain_profile.is_none()
            && (self.notarization.apple_id.is_some() != self.notarization.team_id.is_some())
        {
            return Err(Error::config(
                "notarization.apple_id and notarization.team_id must be set together",
            ));
        }
        Ok(())
    }

    /// Look up dependencies by name, keeping configured order.
    pub fn select_dependencies(&self, only: &[String]) -> Result<Vec<&DependencySpec>> {
        if only.is_empty() {
            return Ok(self.dependencies.iter().collect());
        }

        for name in only {
            if !self.dependencies.iter().any(|d| &d.name == name) {
                return Err(Error::config(format!("unknown dependency '{}'", name)));
            }
        }
        Ok(self
            .dependencies
            .iter()
            .filter(|d| only.contains(&d.name))
            .collect())
    }
}

/// Application build settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Product name, used in image and archive names.
    pub name: String,

    pub bundle_id: Option<String>,

    /// Executable in `Contents/MacOS`. Defaults to `CFBundleExecutable`,
    /// then the bundle name.
    pub executable: Option<String>,

    /// Bundle location relative to the install directory. Defaults to
    /// `<name>.app`.
    pub bundle_path: Option<PathBuf>,

    /// Plugin directory inside `Contents/Plugins`.
    pub plugin_dir: String,

    /// Application sources; `macship build` can override it.
    pub source_dir: Option<PathBuf>,

    /// CMakeLists file holding `project(... VERSION x.y.z)`, relative to
    /// the sources. Defaults to the top-level `CMakeLists.txt`.
    pub version_file: Option<PathBuf>,

    /// Extra `-D` options, without the `-D`.
    pub cmake_options: BTreeMap<String, String>,

    pub cxx_flags: String,

    /// Passed as `CMAKE_IGNORE_PATH`.
    pub ignore_paths: Vec<String>,

    /// Load path fixups for bundle binaries, relative to `Contents`.
    pub fixups: Vec<LoadPathFixup>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "App".to_string(),
            bundle_id: None,
            executable: None,
            bundle_path: None,
            plugin_dir: "PlugIns".to_string(),
            source_dir: None,
            version_file: None,
            cmake_options: BTreeMap::new(),
            cxx_flags: String::new(),
            ignore_paths: Vec::new(),
            fixups: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn bundle_path(&self) -> PathBuf {
        self.bundle_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("{}.app", self.name)))
    }
}

/// One third-party library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencySpec {
    pub name: String,
    pub source: SourceSpec,
    pub build: BuildSpec,
}

/// Where a dependency's sources come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceSpec {
    /// Tarball downloaded over HTTP.
    Archive {
        url: String,
        /// Hex digest, optionally prefixed with `sha256:`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    /// Git repository at a tag, branch or commit.
    Git {
        url: String,
        rev: String,
        /// Shell commands run in the checkout after cloning.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        after_clone: Vec<String>,
    },
}

/// How a dependency is configured, built and installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "system", rename_all = "lowercase")]
pub enum BuildSpec {
    Cmake {
        /// Overrides for the default `-D` options, without the `-D`.
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
    Autotools {
        /// Extra `configure` arguments.
        #[serde(default)]
        options: Vec<String>,
        /// Build in a separate directory; otherwise sources are copied
        /// into the build directory first.
        #[serde(default = "default_true")]
        out_of_tree: bool,
    },
    Qt5 {
        /// Qt modules passed to `-skip`.
        #[serde(default)]
        skip: Vec<String>,
    },
    Boost,
}

fn default_true() -> bool {
    true
}

/// Changes the dependency `old` to `new` in binaries matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadPathFixup {
    /// Relative path whose last component may contain `*` wildcards.
    pub pattern: String,
    pub old: String,
    /// Replacement; `{prefix}` expands to the install prefix.
    pub new: String,
}

impl LoadPathFixup {
    /// Replacement path with placeholders expanded.
    pub fn new_path(&self, prefix: &Path) -> String {
        self.new.replace("{prefix}", &prefix.to_string_lossy())
    }
}

/// Relocation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelocationConfig {
    /// Extra path prefixes treated as system libraries.
    pub system_prefixes: Vec<String>,
    /// Extra directories searched for bare library names.
    pub search_paths: Vec<PathBuf>,
}

/// Code signing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SigningConfig {
    /// Developer ID identity; `MACSHIP_SIGNING_IDENTITY` overrides it.
    pub identity: Option<String>,
    pub entitlements: Option<PathBuf>,
}

/// Notary service credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotarizationConfig {
    /// Profile stored with `xcrun notarytool store-credentials`.
    pub keychain_profile: Option<String>,
    pub apple_id: Option<String>,
    pub team_id: Option<String>,
    /// Environment variable holding the app-specific password.
    pub password_env: String,
}

impl Default for NotarizationConfig {
    fn default() -> Self {
        Self {
            keychain_profile: None,
            apple_id: None,
            team_id: None,
            password_env: DEFAULT_PASSWORD_ENV.to_string(),
        }
    }
}

/// Disk image layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DmgConfig {
    /// Volume name; `{app}`, `{version}` and `{arch}` are expanded.
    pub volume_name: String,
    pub background: Option<PathBuf>,
    pub eula: Option<PathBuf>,
    pub window_pos: [u32; 2],
    pub window_size: [u32; 2],
    pub icon_size: u32,
    /// Position of the application icon.
    pub app_icon: [u32; 2],
    /// Other items of the source folder.
    pub icons: Vec<DmgIcon>,
    pub app_drop_link: [u32; 2],
}

impl Default for DmgConfig {
    fn default() -> Self {
        Self {
            volume_name: "{app} {version} {arch}".to_string(),
            background: None,
            eula: None,
            window_pos: [200, 120],
            window_size: [800, 400],
            icon_size: 100,
            app_icon: [200, 100],
            icons: Vec::new(),
            app_drop_link: [600, 185],
        }
    }
}

/// Icon placement for a file in the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DmgIcon {
    pub name: String,
    pub position: [u32; 2],
}
