#![allow(dead_code)]

use solvra_intercept::{LiteralReplacer, ModuleLoader, TransformError, Transformer};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

pub const ORIGINAL: &str = "solvra/1.0";
pub const REWRITTEN: &str = "intercepted";

pub const MAIN: &str = "main.svs";
pub const SAME_LEVEL: &str = "same-level-lib-7.svs";
pub const SAME_LEVEL_DEP: &str = "same-level-lib-7-dep.svs";
pub const LIB: &str = "solvra_modules/lib-7.svs";
pub const LIB_DEP: &str = "solvra_modules/lib-7-dep.svs";

/// Project tree with first-party modules and a vendored dependency that
/// itself imports a dependency.
pub struct Fixture {
    _dir: TempDir,
    pub root: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonical temp dir");
        let fixture = Self { _dir: dir, root };
        fixture.write(
            MAIN,
            "import lib from \"lib-7\";\n\
             import same from \"./same-level-lib-7.svs\";\n\
             export userAgent = \"solvra/1.0\";\n\
             export libUa = lib.userAgent;\n\
             export libDepUa = lib.depUa;\n\
             export sameUa = same.userAgent;\n\
             export sameDepUa = same.depUa;\n",
        );
        fixture.write(
            SAME_LEVEL,
            "import dep from \"./same-level-lib-7-dep.svs\";\n\
             export userAgent = \"solvra/1.0\";\n\
             export depUa = dep.userAgent;\n",
        );
        fixture.write(SAME_LEVEL_DEP, "export userAgent = \"solvra/1.0\";\n");
        fixture.write(
            LIB,
            "// vendored\n\
             import dep from \"./lib-7-dep.svs\";\n\
             export userAgent = \"solvra/1.0\";\n\
             export depUa = dep.userAgent;\n",
        );
        fixture.write(LIB_DEP, "export userAgent = \"solvra/1.0\";\n");
        fixture
    }

    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create module dir");
        }
        fs::write(&path, contents).expect("write module");
        path
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn loader(&self) -> Arc<ModuleLoader> {
        Arc::new(ModuleLoader::new(&self.root))
    }

    pub fn source(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).expect("read module")
    }
}

/// `userAgent` values reachable from the main module, keyed by module.
pub fn user_agents(loader: &ModuleLoader, main: &Path) -> Vec<(&'static str, String)> {
    let module = loader.require_path(main).expect("load main module");
    ["userAgent", "libUa", "libDepUa", "sameUa", "sameDepUa"]
        .into_iter()
        .map(|name| {
            let value = module
                .export_str(name)
                .unwrap_or_else(|| panic!("missing export {name}"))
                .to_string();
            (name, value)
        })
        .collect()
}

pub fn agent<'a>(agents: &'a [(&'static str, String)], name: &str) -> &'a str {
    agents
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.as_str())
        .unwrap_or_else(|| panic!("missing agent {name}"))
}

/// Rewrites the user agent literal and counts invocations.
#[derive(Clone)]
pub struct CountingTransformer {
    inner: LiteralReplacer,
    calls: Arc<AtomicUsize>,
}

impl CountingTransformer {
    pub fn new() -> Self {
        Self {
            inner: LiteralReplacer::strings(ORIGINAL, REWRITTEN),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transformer for CountingTransformer {
    fn transform(&self, source: &str) -> Result<String, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.transform(source)
    }
}
