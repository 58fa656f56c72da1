//! Configuration for the `qsync` engine.
//!
//! The configuration is a TOML file discovered in the workspace root (see
//! [`discover_config_path`]). Every section is optional and unknown keys are rejected.

mod logging;

use qsync_core::{LanguageClass, ProjectDefinition};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use parking_lot::ReentrantMutex;
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};

/// Environment variable overriding config discovery.
pub const QSYNC_CONFIG_ENV_VAR: &str = "QSYNC_CONFIG_PATH";

/// Default number of threads copying artifacts into the cache.
pub const DEFAULT_COPY_THREADS: usize = 16;
/// Upper bound for the copy pool size.
pub const MAX_COPY_THREADS: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Workspace-relative directories in the project. A leading `-` excludes a directory.
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default = "ProjectConfig::default_languages")]
    pub languages: Vec<String>,
}

impl ProjectConfig {
    fn default_languages() -> Vec<String> {
        vec!["java".to_string(), "kotlin".to_string()]
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            languages: Self::default_languages(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Build tool executable; looked up on `PATH` when not absolute.
    #[serde(default = "BuildConfig::default_binary")]
    pub binary: String,
    #[serde(default)]
    pub build_flags: Vec<String>,
    #[serde(default)]
    pub query_flags: Vec<String>,
    /// Kill builds and queries running longer than this. Unlimited when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl BuildConfig {
    fn default_binary() -> String {
        "bazel".to_string()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            binary: Self::default_binary(),
            build_flags: Vec::new(),
            query_flags: Vec::new(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache root, relative to the workspace root unless absolute.
    #[serde(default = "CacheConfig::default_dir")]
    pub dir: PathBuf,
    #[serde(default = "CacheConfig::default_copy_threads")]
    pub copy_threads: usize,
}

impl CacheConfig {
    fn default_dir() -> PathBuf {
        PathBuf::from(".qsync/cache")
    }

    fn default_copy_threads() -> usize {
        DEFAULT_COPY_THREADS
    }

    /// Copy pool size, clamped to `1..=128`.
    pub fn copy_threads(&self) -> usize {
        self.copy_threads.clamp(1, MAX_COPY_THREADS)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: Self::default_dir(),
            copy_threads: Self::default_copy_threads(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Where sync state is persisted, relative to the workspace root unless absolute.
    #[serde(default = "SyncConfig::default_data_dir")]
    pub data_dir: PathBuf,
}

impl SyncConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from(".qsync")
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QsyncConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("unsupported language in [project] languages: {0}")]
    Language(String),
    #[error("no project directories configured; add `directories` to [project]")]
    NoProjectDirectories,
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // Only the message; the default rendering quotes the input.
        ConfigError::Toml(err.message().to_string())
    }
}

impl QsyncConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The project boundary described by `[project]`.
    pub fn project_definition(&self) -> Result<ProjectDefinition, ConfigError> {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for entry in &self.project.directories {
            let entry = entry.trim();
            match entry.strip_prefix('-') {
                Some(excluded) => exclude.push(PathBuf::from(excluded.trim())),
                None => include.push(PathBuf::from(entry)),
            }
        }
        if include.is_empty() {
            return Err(ConfigError::NoProjectDirectories);
        }

        let languages = self
            .project
            .languages
            .iter()
            .map(|lang| lang.parse::<LanguageClass>().map_err(ConfigError::Language))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ProjectDefinition::new(include, exclude, languages))
    }

    pub fn cache_dir(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.cache.dir)
    }

    pub fn data_dir(&self, workspace_root: &Path) -> PathBuf {
        resolve(workspace_root, &self.sync.data_dir)
    }
}

fn resolve(workspace_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace_root.join(path)
    }
}

static CONFIG_ENV_LOCK: OnceLock<ReentrantMutex<()>> = OnceLock::new();

fn config_env_lock() -> &'static ReentrantMutex<()> {
    CONFIG_ENV_LOCK.get_or_init(|| ReentrantMutex::new(()))
}

/// Run `f` while holding the config environment lock.
///
/// Tests that set [`QSYNC_CONFIG_ENV_VAR`] wrap the mutation and discovery in this helper so
/// concurrent discovery never observes the override.
pub fn with_config_env_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = config_env_lock().lock();
    f()
}

/// Discover the configuration file for a workspace root.
///
/// Search order:
/// 1) `QSYNC_CONFIG_PATH` (absolute or relative to `workspace_root`)
/// 2) `qsync.toml`
/// 3) `.qsync.toml`
/// 4) `.qsync/config.toml`
pub fn discover_config_path(workspace_root: &Path) -> Option<PathBuf> {
    let _guard = config_env_lock().lock();
    if let Some(value) = std::env::var_os(QSYNC_CONFIG_ENV_VAR) {
        let path = resolve(workspace_root, Path::new(&value));
        return Some(path.canonicalize().unwrap_or(path));
    }

    ["qsync.toml", ".qsync.toml", ".qsync/config.toml"]
        .into_iter()
        .map(|name| workspace_root.join(name))
        .find(|path| path.is_file())
        .map(|path| path.canonicalize().unwrap_or(path))
}

/// Load the configuration for a workspace root.
///
/// If no config is present, returns [`QsyncConfig::default`] and `None`.
pub fn load_for_workspace(
    workspace_root: &Path,
) -> Result<(QsyncConfig, Option<PathBuf>), ConfigError> {
    let Some(path) = discover_config_path(workspace_root) else {
        return Ok((QsyncConfig::default(), None));
    };
    let config = QsyncConfig::load_from_path(&path)?;
    Ok((config, Some(path)))
}
