//=====================================================
// File: intercept/policy.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Decide which module loads get rewritten
// Objective: Model the interception policies, validate loosely typed policy
//            descriptions up front and classify paths as dependencies
//=====================================================

use super::InterceptError;
use crate::modules::{ModuleError, ModuleLoader, canonical_path_buf};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptionPolicy {
    AllModules,
    NoDependencyModules,
    TopLevelDependencyModulesOnly,
    ExplicitPathSet(BTreeSet<PathBuf>),
}

impl InterceptionPolicy {
    pub const NO_DEPENDENCY_MODULES: i64 = 1;
    pub const TOP_LEVEL_DEPENDENCY_MODULES_ONLY: i64 = 2;
    pub const ALL_MODULES: i64 = 3;

    /// Policy covering exactly `paths`; entries are canonicalised when they exist.
    pub fn explicit_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        InterceptionPolicy::ExplicitPathSet(
            paths
                .into_iter()
                .map(|path| canonical_path_buf(path.as_ref()))
                .collect(),
        )
    }

    pub fn from_code(code: i64) -> Result<Self, InterceptError> {
        match code {
            Self::NO_DEPENDENCY_MODULES => Ok(InterceptionPolicy::NoDependencyModules),
            Self::TOP_LEVEL_DEPENDENCY_MODULES_ONLY => Ok(InterceptionPolicy::TopLevelDependencyModulesOnly),
            Self::ALL_MODULES => Ok(InterceptionPolicy::AllModules),
            other => Err(InterceptError::InvalidPolicy(format!(
                "unknown policy code {}",
                other
            ))),
        }
    }

    /// Directory-relative policies need the host's entry directory.
    pub fn needs_entry_dir(&self) -> bool {
        matches!(
            self,
            InterceptionPolicy::NoDependencyModules | InterceptionPolicy::TopLevelDependencyModulesOnly
        )
    }

    pub fn is_eligible(
        &self,
        path: &Path,
        requester: Option<&Path>,
        loader: &ModuleLoader,
    ) -> Result<bool, ModuleError> {
        match self {
            InterceptionPolicy::AllModules => Ok(true),
            InterceptionPolicy::ExplicitPathSet(paths) => Ok(paths.contains(path)),
            InterceptionPolicy::NoDependencyModules => {
                let entry_dir = require_entry_dir(loader, path)?;
                Ok(!is_dependency_path(entry_dir, path, loader.dependency_dir()))
            }
            InterceptionPolicy::TopLevelDependencyModulesOnly => {
                let entry_dir = require_entry_dir(loader, path)?;
                Ok(match requester {
                    // Loads issued by the host itself are first-party.
                    None => true,
                    Some(requester) => !is_dependency_path(entry_dir, requester, loader.dependency_dir()),
                })
            }
        }
    }
}

fn require_entry_dir<'a>(loader: &'a ModuleLoader, path: &Path) -> Result<&'a Path, ModuleError> {
    loader.entry_dir().ok_or_else(|| ModuleError::UnsupportedPlatform {
        path: path.to_path_buf(),
    })
}

impl fmt::Display for InterceptionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptionPolicy::AllModules => f.write_str("all"),
            InterceptionPolicy::NoDependencyModules => f.write_str("no-dependencies"),
            InterceptionPolicy::TopLevelDependencyModulesOnly => f.write_str("top-level-dependencies"),
            InterceptionPolicy::ExplicitPathSet(paths) => write!(f, "explicit({} paths)", paths.len()),
        }
    }
}

impl FromStr for InterceptionPolicy {
    type Err = InterceptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(InterceptionPolicy::AllModules),
            "no-dependencies" => Ok(InterceptionPolicy::NoDependencyModules),
            "top-level-dependencies" => Ok(InterceptionPolicy::TopLevelDependencyModulesOnly),
            other => Err(InterceptError::InvalidPolicy(format!(
                "unknown policy name '{}'",
                other
            ))),
        }
    }
}

/// Path from `base` to `target`, using `..` where `target` is outside `base`.
pub fn relative_path(base: &Path, target: &Path) -> PathBuf {
    let base: Vec<Component<'_>> = base.components().collect();
    let target: Vec<Component<'_>> = target.components().collect();
    let shared = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in shared..base.len() {
        relative.push("..");
    }
    for component in &target[shared..] {
        relative.push(component.as_os_str());
    }
    relative
}

/// Whether `path`, seen from `entry_dir`, passes through a dependency directory.
pub fn is_dependency_path(entry_dir: &Path, path: &Path, dependency_dir: &str) -> bool {
    relative_path(entry_dir, path)
        .components()
        .any(|component| matches!(component, Component::Normal(name) if name == dependency_dir))
}

//=====================================================
// Loose policy descriptions
//=====================================================

/// Anything that can describe an interception policy. Conversion happens
/// when the interceptor is built, so bad descriptions never reach a load.
pub trait IntoPolicy {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError>;
}

impl IntoPolicy for InterceptionPolicy {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        Ok(self)
    }
}

macro_rules! impl_policy_code {
    ($($ty:ty),*) => {
        $(
            impl IntoPolicy for $ty {
                fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
                    InterceptionPolicy::from_code(self as i64)
                }
            }
        )*
    };
}

impl_policy_code!(u8, u32, i32, i64);

impl IntoPolicy for &str {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        self.parse()
    }
}

impl IntoPolicy for String {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        self.parse()
    }
}

impl<P: AsRef<Path>> IntoPolicy for Vec<P> {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        Ok(InterceptionPolicy::explicit_paths(self))
    }
}

impl<P: AsRef<Path>> IntoPolicy for &[P] {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        Ok(InterceptionPolicy::explicit_paths(self))
    }
}

impl<P: AsRef<Path>, const N: usize> IntoPolicy for [P; N] {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        Ok(InterceptionPolicy::explicit_paths(self))
    }
}

impl IntoPolicy for BTreeSet<PathBuf> {
    fn into_policy(self) -> Result<InterceptionPolicy, InterceptError> {
        Ok(InterceptionPolicy::explicit_paths(self))
    }
}
