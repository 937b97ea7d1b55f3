//! In-process registry of workflow instances
//!
//! The registry is the single source of truth for "what is running". Active
//! instances are shared between the executor task and status/stop callers
//! through a handle; terminal instances move to a bounded history ring.

use super::instance::WorkflowInstance;
use crate::error::{EngineError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Terminal instances kept in memory before the oldest is dropped
pub const DEFAULT_HISTORY_RETENTION: usize = 100;

/// Shared view of one active workflow.
///
/// The executor mutates the instance through `update`; everyone else reads
/// snapshots. The stop flag is cooperative: setting it never interrupts a
/// step in flight, the executor observes it at the next step boundary.
#[derive(Clone)]
pub struct WorkflowHandle {
    instance: Arc<RwLock<WorkflowInstance>>,
    stop: Arc<AtomicBool>,
}

impl WorkflowHandle {
    fn new(instance: WorkflowInstance) -> Self {
        Self {
            instance: Arc::new(RwLock::new(instance)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.instance.read().unwrap().id
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> WorkflowInstance {
        self.instance.read().unwrap().clone()
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut WorkflowInstance),
    {
        let mut instance = self.instance.write().unwrap();
        f(&mut instance);
    }
}

struct Inner {
    active: HashMap<Uuid, WorkflowHandle>,
    history: VecDeque<WorkflowInstance>,
}

/// Lock-guarded map of active workflows plus a bounded terminal history
pub struct WorkflowRegistry {
    inner: RwLock<Inner>,
    retention: usize,
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_RETENTION)
    }
}

impl WorkflowRegistry {
    pub fn new(retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                active: HashMap::new(),
                history: VecDeque::new(),
            }),
            retention,
        }
    }

    /// Register a new instance and hand back its shared handle
    pub fn register(&self, instance: WorkflowInstance) -> Result<WorkflowHandle> {
        let mut inner = self.inner.write().unwrap();
        let id = instance.id;
        if inner.active.contains_key(&id) {
            return Err(EngineError::Validation(format!(
                "workflow {id} is already registered"
            )));
        }
        let handle = WorkflowHandle::new(instance);
        inner.active.insert(id, handle.clone());
        Ok(handle)
    }

    /// Snapshot of an instance by id, active or recently finished
    pub fn get(&self, id: Uuid) -> Option<WorkflowInstance> {
        let inner = self.inner.read().unwrap();
        if let Some(handle) = inner.active.get(&id) {
            return Some(handle.snapshot());
        }
        inner.history.iter().find(|i| i.id == id).cloned()
    }

    pub fn list_active(&self) -> Vec<WorkflowInstance> {
        let inner = self.inner.read().unwrap();
        let mut instances: Vec<_> = inner.active.values().map(|h| h.snapshot()).collect();
        instances.sort_by_key(|i| i.started_at);
        instances
    }

    pub fn history(&self) -> Vec<WorkflowInstance> {
        let inner = self.inner.read().unwrap();
        inner.history.iter().cloned().collect()
    }

    /// Request a cooperative stop of an active workflow
    pub fn stop(&self, id: Uuid) -> Result<()> {
        let inner = self.inner.read().unwrap();
        match inner.active.get(&id) {
            Some(handle) => {
                handle.request_stop();
                Ok(())
            }
            None => Err(EngineError::WorkflowNotFound(id.to_string())),
        }
    }

    /// Move a terminal instance out of the active map into history
    pub fn finalize(&self, id: Uuid) {
        let mut inner = self.inner.write().unwrap();
        if let Some(handle) = inner.active.remove(&id) {
            let snapshot = handle.snapshot();
            debug_assert!(snapshot.status.is_terminal());
            inner.history.push_back(snapshot);
            while inner.history.len() > self.retention {
                inner.history.pop_front();
            }
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read().unwrap();
        (inner.active.len(), inner.history.len())
    }
}
