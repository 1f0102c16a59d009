//=====================================================
// File: intercept/mod.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Load-time source interception for SolvraScript modules
// Objective: Swap the loader's compile stage for a rewriting one, limited
//            to a policy and a scope, and restore the stage and module
//            cache once the scope ends
//=====================================================

use crate::modules::{
    CompileRequest, CompileStage, InstalledStage, Module, ModuleError, ModuleLoader, OwnerId, StageId,
};
use crate::rewrite::Transformer;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod policy;
pub mod scope;

pub use policy::{InterceptionPolicy, IntoPolicy, is_dependency_path, relative_path};
pub use scope::{ScopeGuard, ScopedFuture};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InterceptError {
    #[error("invalid interception policy: {0}")]
    InvalidPolicy(String),
    #[error("module loading is already intercepted by interceptor #{holder}")]
    HookBusy { holder: OwnerId },
}

//=====================================================
// Section 1.0 - Interceptor
//=====================================================

/// Handle to one policy/transformer pairing over a shared loader.
///
/// Clones share state; activating through one clone is visible through all.
#[derive(Clone)]
pub struct Interceptor {
    inner: Arc<Shared>,
}

struct Shared {
    id: OwnerId,
    loader: Arc<ModuleLoader>,
    original_stage: InstalledStage,
    original_cache_keys: BTreeSet<PathBuf>,
    policy: Arc<InterceptionPolicy>,
    stage: Arc<dyn CompileStage>,
}

impl Interceptor {
    /// Build an interceptor, snapshotting the loader's current compile stage
    /// and cache keys. The snapshot is reused by every later activation.
    pub fn new<P, T>(loader: Arc<ModuleLoader>, policy: P, transformer: T) -> Result<Self, InterceptError>
    where
        P: IntoPolicy,
        T: Transformer + 'static,
    {
        let policy = Arc::new(policy.into_policy()?);
        let original_stage = loader.pipeline().current();
        if let Some(holder) = original_stage.owner() {
            return Err(InterceptError::HookBusy { holder });
        }
        if policy.needs_entry_dir() && loader.entry_dir().is_none() {
            warn!(policy = %policy, "loader has no entry directory; every load under this policy will fail");
        }
        let original_cache_keys = loader.cache_keys();
        let stage: Arc<dyn CompileStage> = Arc::new(InterceptingStage {
            policy: Arc::clone(&policy),
            transformer: Box::new(transformer),
            original: original_stage.clone(),
        });
        let id = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        debug!(interceptor = id, policy = %policy, "interceptor created");
        Ok(Self {
            inner: Arc::new(Shared {
                id,
                loader,
                original_stage,
                original_cache_keys,
                policy,
                stage,
            }),
        })
    }

    pub fn id(&self) -> OwnerId {
        self.inner.id
    }

    pub fn policy(&self) -> &InterceptionPolicy {
        &self.inner.policy
    }

    pub fn is_active(&self) -> bool {
        self.inner.loader.pipeline().owner() == Some(self.inner.id)
    }

    /// Install the rewriting stage. Activating again while active keeps the
    /// stage already installed and hands out a token that restores nothing,
    /// so only the outermost activation ends interception.
    pub fn activate(&self) -> Result<RestoreToken, InterceptError> {
        let shared = &self.inner;
        let claim = shared
            .loader
            .pipeline()
            .claim(shared.id, &shared.stage)
            .map_err(|holder| InterceptError::HookBusy { holder })?;
        if claim.fresh {
            info!(interceptor = shared.id, stage = claim.stage, policy = %shared.policy, "module interception active");
        } else {
            debug!(interceptor = shared.id, stage = claim.stage, "interception already active");
        }
        Ok(RestoreToken {
            interceptor: self.clone(),
            stage: claim.stage,
            fresh: claim.fresh,
        })
    }

    /// Put the original stage back and evict every module cached since the
    /// snapshot. Returns `false` when this interceptor was not active.
    pub fn deactivate(&self) -> bool {
        self.release(None)
    }

    fn release(&self, expected: Option<StageId>) -> bool {
        let shared = &self.inner;
        let pipeline = shared.loader.pipeline();
        if !pipeline.release(shared.id, expected, &shared.original_stage) {
            match pipeline.owner() {
                Some(holder) if holder != shared.id => warn!(
                    interceptor = shared.id,
                    holder, "deactivate ignored: pipeline is held by another interceptor"
                ),
                Some(_) => debug!(interceptor = shared.id, stage = ?expected, "stale restore token ignored"),
                None => {}
            }
            return false;
        }
        let evicted = shared
            .loader
            .retain_cache(|key| shared.original_cache_keys.contains(key));
        info!(interceptor = shared.id, evicted, "module interception restored");
        true
    }

    /// Run `work` with interception active. The original stage is restored
    /// when `work` returns or unwinds.
    pub fn run_scoped<F, R>(&self, work: F) -> Result<R, InterceptError>
    where
        F: FnOnce() -> R,
    {
        let _guard = ScopeGuard::new(self.activate()?);
        Ok(work())
    }

    /// Start `work` with interception active and keep it active until the
    /// returned future settles or is dropped.
    pub fn run_scoped_async<F, Fut>(&self, work: F) -> Result<ScopedFuture<Fut>, InterceptError>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let guard = ScopeGuard::new(self.activate()?);
        let future = work();
        Ok(ScopedFuture::new(future, guard))
    }
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("id", &self.inner.id)
            .field("policy", &self.inner.policy)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Proof of one successful activation.
///
/// Only a token from the activation that installed the stage restores it;
/// tokens from re-entrant activations, or from an activation that has since
/// been deactivated, restore nothing.
#[must_use = "dropping the token leaves interception active; call `restore`"]
#[derive(Debug)]
pub struct RestoreToken {
    interceptor: Interceptor,
    stage: StageId,
    fresh: bool,
}

impl RestoreToken {
    pub fn stage_id(&self) -> StageId {
        self.stage
    }

    /// Whether this activation installed the stage.
    pub fn is_outermost(&self) -> bool {
        self.fresh
    }

    pub fn restore(self) -> bool {
        self.fresh && self.interceptor.release(Some(self.stage))
    }
}

//=====================================================
// Section 2.0 - Intercepting Compile Stage
//=====================================================

struct InterceptingStage {
    policy: Arc<InterceptionPolicy>,
    transformer: Box<dyn Transformer>,
    original: InstalledStage,
}

impl CompileStage for InterceptingStage {
    fn compile(&self, mut request: CompileRequest<'_>, loader: &ModuleLoader) -> Result<Module, ModuleError> {
        let eligible = self.policy.is_eligible(request.path, request.requester, loader)?;
        debug!(
            path = %request.path.display(),
            requester = ?request.requester.map(|p| p.display()),
            eligible,
            "interception decision"
        );
        if eligible {
            request.content = self
                .transformer
                .transform(&request.content)
                .map_err(|error| ModuleError::Transform {
                    path: request.path.to_path_buf(),
                    error,
                })?;
        }
        self.original.compile(request, loader)
    }
}
