//=============================================
// solvra_intercept/modules.rs
//=============================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: SolvraScript module loader with a shared cache
// Objective: Resolve import specifiers to files, compile them through the
//            swappable load pipeline and cache the results by path
//=============================================

use crate::ast::Literal;
use crate::parser::ParseError;
use crate::rewrite::TransformError;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use thiserror::Error;
use tracing::{debug, trace};

pub mod compiler;
pub mod pipeline;

pub use compiler::{NativeCompiler, compute_fingerprint};
pub use pipeline::{Claim, CompileRequest, CompileStage, InstalledStage, LoadPipeline, OwnerId, StageId};

/// Directory name that marks vendored third-party modules.
pub const DEFAULT_DEPENDENCY_DIR: &str = "solvra_modules";
pub const SCRIPT_EXTENSION: &str = "svs";

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Module(Arc<Module>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Module(_) => "module",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Module(module) => module.exports_json(),
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Str(s) => Value::Str(s.clone()),
            Literal::Int(n) => Value::Int(*n),
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

/// A compiled module as stored in the loader cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub id: PathBuf,
    pub exports: BTreeMap<String, Value>,
    pub fingerprint: String,
}

impl Module {
    pub fn export(&self, name: &str) -> Option<&Value> {
        self.exports.get(name)
    }

    pub fn export_str(&self, name: &str) -> Option<&str> {
        self.export(name).and_then(Value::as_str)
    }

    pub fn exports_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.exports
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module '{module}' could not be located")]
    NotFound { module: String },
    #[error("Failed reading module '{}': {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },
    #[error("Parse error while loading '{}': {error}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: ParseError,
    },
    #[error("Parse error while loading '{}' (rewritten source): {error}", .path.display())]
    Transform {
        path: PathBuf,
        #[source]
        error: TransformError,
    },
    #[error("Cyclic module import detected for '{module}'")]
    Cyclic { module: String },
    #[error("Evaluation failed for '{}': {message}", .path.display())]
    Evaluate { path: PathBuf, message: String },
    #[error(
        "cannot decide whether '{}' is a dependency: this host does not expose the entry directory",
        .path.display()
    )]
    UnsupportedPlatform { path: PathBuf },
}

impl ModuleError {
    /// Rewrite failures surface the same way as ordinary syntax errors.
    pub fn is_syntax_error(&self) -> bool {
        matches!(self, ModuleError::Parse { .. } | ModuleError::Transform { .. })
    }
}

#[derive(Debug)]
pub struct ModuleLoader {
    entry_dir: Option<PathBuf>,
    dependency_dir: String,
    script_paths: Vec<PathBuf>,
    pipeline: LoadPipeline,
    cache: RwLock<HashMap<PathBuf, Arc<Module>>>,
    in_flight: Mutex<HashSet<(ThreadId, PathBuf)>>,
}

impl ModuleLoader {
    /// Loader for a host whose entry point lives in `entry_dir`.
    pub fn new(entry_dir: impl Into<PathBuf>) -> Self {
        let entry_dir = entry_dir.into();
        Self::build(Some(canonical_path_buf(&entry_dir)))
    }

    /// Loader for a host that cannot report its entry directory.
    pub fn without_entry_dir() -> Self {
        Self::build(None)
    }

    fn build(entry_dir: Option<PathBuf>) -> Self {
        Self {
            entry_dir,
            dependency_dir: DEFAULT_DEPENDENCY_DIR.to_string(),
            script_paths: Vec::new(),
            pipeline: LoadPipeline::new(Arc::new(NativeCompiler)),
            cache: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_dependency_dir(mut self, name: impl Into<String>) -> Self {
        self.dependency_dir = name.into();
        self
    }

    pub fn add_script_path<P: Into<PathBuf>>(&mut self, path: P) {
        let path = path.into();
        if !self.script_paths.contains(&path) {
            self.script_paths.push(path);
        }
    }

    pub fn entry_dir(&self) -> Option<&Path> {
        self.entry_dir.as_deref()
    }

    pub fn dependency_dir(&self) -> &str {
        &self.dependency_dir
    }

    pub fn pipeline(&self) -> &LoadPipeline {
        &self.pipeline
    }

    //=====================================================
    // Loading
    //=====================================================

    /// Load a module on behalf of the host itself (no requesting module).
    pub fn require(&self, specifier: &str) -> Result<Arc<Module>, ModuleError> {
        self.require_from(specifier, None)
    }

    pub fn require_path(&self, path: &Path) -> Result<Arc<Module>, ModuleError> {
        if !path.is_file() {
            return Err(ModuleError::NotFound {
                module: path.display().to_string(),
            });
        }
        self.load_resolved(canonical_path_buf(path), None)
    }

    pub fn require_from(
        &self,
        specifier: &str,
        requester: Option<&Path>,
    ) -> Result<Arc<Module>, ModuleError> {
        let path = self.resolve(specifier, requester)?;
        self.load_resolved(path, requester)
    }

    fn load_resolved(&self, path: PathBuf, requester: Option<&Path>) -> Result<Arc<Module>, ModuleError> {
        if let Some(module) = self.cached(&path) {
            trace!(path = %path.display(), "module cache hit");
            return Ok(module);
        }

        let compiled = {
            let Some(_flight) = InFlight::enter(&self.in_flight, &path) else {
                return Err(ModuleError::Cyclic {
                    module: path.display().to_string(),
                });
            };
            self.compile_fresh(&path, requester)
        };

        let module = Arc::new(compiled?);
        let mut cache = self.cache.write();
        Ok(Arc::clone(cache.entry(path).or_insert(module)))
    }

    fn compile_fresh(&self, path: &Path, requester: Option<&Path>) -> Result<Module, ModuleError> {
        let content = fs::read_to_string(path).map_err(|error| ModuleError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let stage = self.pipeline.current();
        debug!(
            path = %path.display(),
            requester = ?requester.map(Path::display),
            stage = stage.id(),
            "compiling module"
        );
        stage.compile(
            CompileRequest {
                content,
                path,
                requester,
            },
            self,
        )
    }

    //=====================================================
    // Resolution
    //=====================================================

    pub fn resolve(&self, specifier: &str, requester: Option<&Path>) -> Result<PathBuf, ModuleError> {
        let base_dir = requester
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .or_else(|| self.entry_dir.clone())
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let direct = Path::new(specifier);
        let mut candidates = Vec::new();
        if direct.is_absolute() {
            candidates.push(direct.to_path_buf());
        } else if specifier.starts_with("./") || specifier.starts_with("../") {
            candidates.push(base_dir.join(specifier));
        } else {
            for root in &self.script_paths {
                candidates.push(root.join(specifier));
            }
            for dir in base_dir.ancestors() {
                candidates.push(dir.join(&self.dependency_dir).join(specifier));
            }
        }

        for candidate in candidates {
            if let Some(found) = find_module_file(&candidate) {
                return Ok(canonical_path_buf(&found));
            }
        }

        Err(ModuleError::NotFound {
            module: specifier.to_string(),
        })
    }

    //=====================================================
    // Cache
    //=====================================================

    pub fn cached(&self, path: &Path) -> Option<Arc<Module>> {
        self.cache.read().get(path).cloned()
    }

    pub fn cache_keys(&self) -> BTreeSet<PathBuf> {
        self.cache.read().keys().cloned().collect()
    }

    pub fn evict(&self, path: &Path) -> bool {
        self.cache.write().remove(path).is_some()
    }

    /// Keep only entries whose key passes `keep`; returns how many were dropped.
    pub fn retain_cache<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Path) -> bool,
    {
        let mut cache = self.cache.write();
        let before = cache.len();
        cache.retain(|key, _| keep(key));
        before - cache.len()
    }
}

/// Marks a path as loading on the current thread until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<(ThreadId, PathBuf)>>,
    key: (ThreadId, PathBuf),
}

impl<'a> InFlight<'a> {
    fn enter(set: &'a Mutex<HashSet<(ThreadId, PathBuf)>>, path: &Path) -> Option<Self> {
        let key = (thread::current().id(), path.to_path_buf());
        if !set.lock().insert(key.clone()) {
            return None;
        }
        Some(Self { set, key })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

fn find_module_file(candidate: &Path) -> Option<PathBuf> {
    if candidate.is_file() {
        return Some(candidate.to_path_buf());
    }
    if candidate.extension().is_none() {
        let with_ext = candidate.with_extension(SCRIPT_EXTENSION);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    if candidate.is_dir() {
        let mod_svs = candidate.join("mod.svs");
        if mod_svs.is_file() {
            return Some(mod_svs);
        }
    }
    None
}

pub fn canonical_path_buf(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
