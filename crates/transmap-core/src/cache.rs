//! Transformer cache: one compiled transformer per type pair and
//! configuration.
//!
//! Each key owns a slot. The thread that creates a slot compiles it;
//! other threads asking for the same key wait for the published result.
//! Compilation itself never waits: nested pairs that are already in progress
//! (a cycle, or another thread) are bound through a forward reference that
//! resolves on first use.

use crate::compiler::MappingCompiler;
use crate::config::{ConfigId, MapConfig};
use crate::planner::PlanError;
use crate::schema::Schema;
use crate::transformer::{ExecutionError, Transformer};
use crate::types::Ty;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};
use tracing::debug;

type CacheKey = (Ty, Ty, ConfigId);

/// Publication point for one key.
pub(crate) struct Slot {
    source: Ty,
    destination: Ty,
    published: OnceLock<Result<Transformer, PlanError>>,
    /// Thread compiling this slot, until it publishes.
    compiling: Mutex<Option<ThreadId>>,
    ready: Condvar,
}

impl Slot {
    fn new(source: Ty, destination: Ty) -> Self {
        Self {
            source,
            destination,
            published: OnceLock::new(),
            compiling: Mutex::new(Some(thread::current().id())),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, result: Result<Transformer, PlanError>) {
        let _ = self.published.set(result);
        *self.compiling.lock() = None;
        self.ready.notify_all();
    }

    /// Block until the slot is published.
    fn wait(&self) -> Result<&Result<Transformer, PlanError>, PlanError> {
        if let Some(result) = self.published.get() {
            return Ok(result);
        }
        let mut compiling = self.compiling.lock();
        loop {
            if let Some(result) = self.published.get() {
                return Ok(result);
            }
            if *compiling == Some(thread::current().id()) {
                return Err(PlanError::Reentrant {
                    from: self.source.clone(),
                    to: self.destination.clone(),
                });
            }
            self.ready.wait(&mut compiling);
        }
    }
}

/// A transformer, or a slot that will hold one.
#[derive(Clone)]
pub(crate) enum TransformerRef {
    Ready(Transformer),
    Forward(Arc<Slot>),
}

impl TransformerRef {
    pub(crate) fn resolve(&self) -> Result<&Transformer, ExecutionError> {
        match self {
            TransformerRef::Ready(transformer) => Ok(transformer),
            TransformerRef::Forward(slot) => {
                let unresolved = |cause: PlanError| ExecutionError::Unresolved {
                    from: slot.source.clone(),
                    to: slot.destination.clone(),
                    cause,
                };
                match slot.wait().map_err(unresolved)? {
                    Ok(transformer) => Ok(transformer),
                    Err(cause) => Err(unresolved(cause.clone())),
                }
            }
        }
    }
}

pub(crate) struct CacheShared {
    schema: Arc<Schema>,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

/// Thread-safe memo of compiled transformers.
///
/// Entries are never evicted implicitly. Failed compilations are cached too.
/// Clones share the same entries.
#[derive(Clone)]
pub struct TransformerCache {
    shared: Arc<CacheShared>,
}

impl TransformerCache {
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                schema: schema.into(),
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<CacheShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<CacheShared> {
        Arc::downgrade(&self.shared)
    }

    pub fn schema(&self) -> &Schema {
        &self.shared.schema
    }

    /// The transformer for a pair, compiling it on first request.
    ///
    /// Concurrent requests for the same key receive the same transformer (or
    /// the same error).
    pub fn get_or_compile(
        &self,
        source: &Ty,
        destination: &Ty,
        config: &MapConfig,
    ) -> Result<Transformer, PlanError> {
        let (slot, owner) = self.slot(source, destination, config);
        if owner {
            return self.compile(&slot, config);
        }
        slot.wait()?.clone()
    }

    /// Non-blocking request used while compiling another pair.
    pub(crate) fn request(
        &self,
        source: &Ty,
        destination: &Ty,
        config: &MapConfig,
    ) -> Result<TransformerRef, PlanError> {
        let (slot, owner) = self.slot(source, destination, config);
        if owner {
            return self.compile(&slot, config).map(TransformerRef::Ready);
        }
        match slot.published.get() {
            Some(Ok(transformer)) => Ok(TransformerRef::Ready(transformer.clone())),
            Some(Err(e)) => Err(e.clone()),
            None => {
                debug!(%source, %destination, "forward reference");
                Ok(TransformerRef::Forward(slot))
            }
        }
    }

    /// Whether a slot exists for this key, compiled or not.
    pub fn contains(&self, source: &Ty, destination: &Ty, config: &MapConfig) -> bool {
        let key = (source.clone(), destination.clone(), config.id());
        self.shared.slots.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.shared.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry. Transformers already handed out keep working.
    pub fn clear(&self) {
        let mut slots = self.shared.slots.lock();
        debug!(entries = slots.len(), "clearing transformer cache");
        slots.clear();
    }

    /// Find or create the slot for a key. `true` if the caller created it
    /// and must compile it.
    fn slot(&self, source: &Ty, destination: &Ty, config: &MapConfig) -> (Arc<Slot>, bool) {
        let key = (source.clone(), destination.clone(), config.id());
        let mut slots = self.shared.slots.lock();
        if let Some(slot) = slots.get(&key) {
            return (slot.clone(), false);
        }
        let slot = Arc::new(Slot::new(source.clone(), destination.clone()));
        slots.insert(key, slot.clone());
        (slot, true)
    }

    fn compile(&self, slot: &Slot, config: &MapConfig) -> Result<Transformer, PlanError> {
        debug!(source = %slot.source, destination = %slot.destination, config = %config.id(), "compiling transformer");
        let result = MappingCompiler::new(self, config).compile_pair(&slot.source, &slot.destination);
        if let Err(e) = &result {
            debug!(source = %slot.source, destination = %slot.destination, error = %e, "compilation failed");
        }
        slot.publish(result.clone());
        result
    }
}

impl fmt::Debug for TransformerCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerCache")
            .field("entries", &self.len())
            .finish()
    }
}
