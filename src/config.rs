//! Configuration for interception hosts, loaded from TOML.

use crate::intercept::{InterceptError, InterceptionPolicy, IntoPolicy};
use crate::modules::{DEFAULT_DEPENDENCY_DIR, ModuleLoader};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Policy as written in a config file: a numeric code, a name, or a list of
/// module paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PolicySpec {
    Code(i64),
    Name(String),
    Paths(Vec<PathBuf>),
}

impl Default for PolicySpec {
    fn default() -> Self {
        PolicySpec::Name("all".to_string())
    }
}

impl IntoPolicy for PolicySpec {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        match self {
            PolicySpec::Code(code) => code.into_policy(),
            PolicySpec::Name(name) => name.into_policy(),
            PolicySpec::Paths(paths) => paths.into_policy(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Which module loads get rewritten.
    pub policy: PolicySpec,
    /// Directory name that marks vendored dependencies.
    pub dependency_dir: String,
    /// Entry directory; defaults to the entry module's directory.
    pub entry_dir: Option<PathBuf>,
    /// When false the loader behaves like a host without entry-point
    /// introspection.
    pub detect_entry_dir: bool,
    /// Extra roots searched for bare module names.
    pub script_paths: Vec<PathBuf>,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            policy: PolicySpec::default(),
            dependency_dir: DEFAULT_DEPENDENCY_DIR.to_string(),
            entry_dir: None,
            detect_entry_dir: true,
            script_paths: Vec::new(),
            log_filter: "info".to_string(),
        }
    }
}

impl InterceptConfig {
    pub fn from_toml_str(data: &str) -> anyhow::Result<Self> {
        toml::from_str(data).context("parsing interception configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading configuration from {}", path.display()))?;
        let mut config: Self = toml::from_str(&data)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Resolve relative paths in the config against `base`.
    pub fn rebase(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        if let Some(entry_dir) = self.entry_dir.as_mut() {
            join(entry_dir);
        }
        self.script_paths.iter_mut().for_each(join);
        if let PolicySpec::Paths(paths) = &mut self.policy {
            paths.iter_mut().for_each(join);
        }
    }

    pub fn policy(&self) -> Result<InterceptionPolicy, InterceptError> {
        self.policy.clone().into_policy()
    }

    /// Build a loader for a host whose entry module is `entry_file`.
    pub fn loader(&self, entry_file: &Path) -> ModuleLoader {
        let mut loader = if !self.detect_entry_dir {
            ModuleLoader::without_entry_dir()
        } else {
            let entry_dir = self
                .entry_dir
                .clone()
                .or_else(|| {
                    entry_file
                        .parent()
                        .filter(|dir| !dir.as_os_str().is_empty())
                        .map(Path::to_path_buf)
                })
                .unwrap_or_else(|| PathBuf::from("."));
            ModuleLoader::new(entry_dir)
        }
        .with_dependency_dir(self.dependency_dir.clone());
        for path in &self.script_paths {
            loader.add_script_path(path.clone());
        }
        loader
    }
}
