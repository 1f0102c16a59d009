//=====================================================
// File: modules/pipeline.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: The swappable compile step of the module loader
// Objective: Hold the single current-stage reference that interception
//            claims and later restores, with ownership tracking
//=====================================================

use super::{Module, ModuleError, ModuleLoader};
use parking_lot::RwLock;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub type StageId = u64;
pub type OwnerId = u64;

/// Outcome of a successful [`LoadPipeline::claim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub stage: StageId,
    /// False when the owner already held the slot.
    pub fresh: bool,
}

/// One module load handed to a compile stage.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    /// Source text to compile; stages may substitute rewritten text.
    pub content: String,
    /// Resolved path of the module, also its cache key.
    pub path: &'a Path,
    /// Module whose import triggered this load; `None` for host loads.
    pub requester: Option<&'a Path>,
}

pub trait CompileStage: Send + Sync {
    fn compile(&self, request: CompileRequest<'_>, loader: &ModuleLoader) -> Result<Module, ModuleError>;
}

/// Snapshot of whatever occupies the pipeline slot.
#[derive(Clone)]
pub struct InstalledStage {
    id: StageId,
    owner: Option<OwnerId>,
    stage: Arc<dyn CompileStage>,
}

impl InstalledStage {
    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.owner
    }

    pub fn compile(&self, request: CompileRequest<'_>, loader: &ModuleLoader) -> Result<Module, ModuleError> {
        self.stage.compile(request, loader)
    }
}

impl fmt::Debug for InstalledStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledStage")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

pub struct LoadPipeline {
    slot: RwLock<InstalledStage>,
    next_id: AtomicU64,
}

impl LoadPipeline {
    pub fn new(stage: Arc<dyn CompileStage>) -> Self {
        Self {
            slot: RwLock::new(InstalledStage {
                id: 1,
                owner: None,
                stage,
            }),
            next_id: AtomicU64::new(2),
        }
    }

    pub fn current(&self) -> InstalledStage {
        self.slot.read().clone()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.slot.read().owner
    }

    /// Install `stage` on behalf of `owner`. Re-claiming by the current owner
    /// keeps the installed stage and reports `fresh: false`; a foreign owner
    /// gets `Err(holder)`.
    pub fn claim(&self, owner: OwnerId, stage: &Arc<dyn CompileStage>) -> Result<Claim, OwnerId> {
        let mut slot = self.slot.write();
        match slot.owner {
            Some(holder) if holder == owner => Ok(Claim {
                stage: slot.id,
                fresh: false,
            }),
            Some(holder) => Err(holder),
            None => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                *slot = InstalledStage {
                    id,
                    owner: Some(owner),
                    stage: Arc::clone(stage),
                };
                Ok(Claim { stage: id, fresh: true })
            }
        }
    }

    /// Put `original` back if `owner` holds the slot and, when `expected` is
    /// given, the installed stage is still that one. Returns whether anything
    /// changed.
    pub fn release(&self, owner: OwnerId, expected: Option<StageId>, original: &InstalledStage) -> bool {
        let mut slot = self.slot.write();
        if slot.owner != Some(owner) || expected.is_some_and(|id| id != slot.id) {
            return false;
        }
        *slot = original.clone();
        true
    }
}

impl fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("current", &*self.slot.read())
            .finish()
    }
}
