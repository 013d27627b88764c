//! The mapper facade: a schema, a configuration and a transformer cache.

use crate::cache::TransformerCache;
use crate::config::MapConfig;
use crate::operation::MappingOperation;
use crate::planner::{OperationPlanner, PlanError};
use crate::schema::Schema;
use crate::transformer::{ExecutionError, Transformer};
use crate::typed::{Mappable, TypedMapper};
use crate::types::Ty;
use crate::value::Value;
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Either a transformer could not be built or it failed while running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Entry point for mapping values between schema types.
///
/// Clones share the cache. Mappers derived with [`Mapper::with_config`] share
/// it too; their transformers are keyed by their own configuration.
#[derive(Debug, Clone)]
pub struct Mapper {
    cache: TransformerCache,
    config: MapConfig,
}

fn global_slot() -> &'static RwLock<Option<Mapper>> {
    static GLOBAL: OnceLock<RwLock<Option<Mapper>>> = OnceLock::new();
    GLOBAL.get_or_init(|| RwLock::new(None))
}

impl Mapper {
    /// A mapper with the default configuration.
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self {
            cache: TransformerCache::new(schema),
            config: MapConfig::default(),
        }
    }

    /// The same schema and cache under another configuration.
    pub fn with_config(&self, config: MapConfig) -> Self {
        Self {
            cache: self.cache.clone(),
            config,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.cache.schema()
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn cache(&self) -> &TransformerCache {
        &self.cache
    }

    /// The transformer for a type pair under this mapper's configuration.
    pub fn transformer(&self, source: &Ty, destination: &Ty) -> std::result::Result<Transformer, PlanError> {
        self.cache.get_or_compile(source, destination, &self.config)
    }

    /// The transformer for a type pair under another configuration.
    pub fn transformer_with(
        &self,
        source: &Ty,
        destination: &Ty,
        config: &MapConfig,
    ) -> std::result::Result<Transformer, PlanError> {
        self.cache.get_or_compile(source, destination, config)
    }

    /// Map `source` to `destination`, taking the source type from the value.
    ///
    /// A null source maps to null.
    pub fn map(&self, source: &Value, destination: &Ty) -> Result<Value> {
        let Some(source_ty) = source.runtime_ty() else {
            return Ok(Value::Null);
        };
        let transformer = self.transformer(&source_ty, destination)?;
        Ok(transformer.map(source)?)
    }

    /// Map `source` onto an existing destination object.
    pub fn map_into(&self, source: &Value, destination: Value) -> Result<Value> {
        let (Some(source_ty), Some(destination_ty)) = (source.runtime_ty(), destination.runtime_ty())
        else {
            return Ok(destination);
        };
        let transformer = self.transformer(&source_ty, &destination_ty)?;
        Ok(transformer.map_into(source, destination)?)
    }

    /// The operations the planner derives for an object pair.
    pub fn plan(&self, source: &Ty, destination: &Ty) -> std::result::Result<Vec<MappingOperation>, PlanError> {
        OperationPlanner::new(self.schema(), &self.config).plan(source, destination)
    }

    /// A typed view of the transformer for `S` -> `D`.
    pub fn typed<S: Mappable, D: Mappable>(&self) -> std::result::Result<TypedMapper<S, D>, PlanError> {
        let transformer = self.transformer(&S::ty(), &D::ty())?;
        Ok(TypedMapper::new(self.cache.clone(), transformer))
    }

    /// Drop every cached transformer.
    pub fn reset(&self) {
        self.cache.clear();
    }

    /// Install `mapper` as the process-wide mapper, returning the previous one.
    pub fn install_global(mapper: Mapper) -> Option<Mapper> {
        debug!(config = %mapper.config.id(), "installing global mapper");
        global_slot().write().replace(mapper)
    }

    /// The process-wide mapper, if one is installed.
    pub fn global() -> Option<Mapper> {
        global_slot().read().clone()
    }

    /// Remove the process-wide mapper.
    pub fn uninstall_global() -> Option<Mapper> {
        global_slot().write().take()
    }
}
