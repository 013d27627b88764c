//! Transformers: compiled, reusable mappings for one type pair.

use crate::cache::{CacheShared, TransformerCache, TransformerRef};
use crate::collection::CollectionBody;
use crate::compiler::ObjectBody;
use crate::config::{ConfigId, MapConfig};
use crate::converter::{ConvertError, Converter, MapState};
use crate::operation::OpDescriptor;
use crate::planner::PlanError;
use crate::types::Ty;
use crate::value::{FieldError, Value};
use std::fmt;
use std::sync::{Arc, Weak};

/// Errors raised while running a transformer.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("error in mapping operation `{operation}`")]
    Operation {
        operation: OpDescriptor,
        #[source]
        cause: Box<ExecutionError>,
    },

    #[error("error mapping element {index}")]
    Element {
        index: usize,
        #[source]
        cause: Box<ExecutionError>,
    },

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("cannot write through null member `{path}`")]
    NullIntermediate { path: String },

    #[error("a destination instance of `{ty}` is required")]
    DestinationRequired { ty: Ty },

    #[error("transformer for `{from}` -> `{to}` could not be built")]
    Unresolved {
        from: Ty,
        to: Ty,
        #[source]
        cause: PlanError,
    },

    #[error("the transformer cache was dropped")]
    CacheDropped,
}

impl ExecutionError {
    /// This error and the errors it wraps, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ExecutionError> {
        std::iter::successors(Some(self), |e| match *e {
            ExecutionError::Operation { cause, .. } | ExecutionError::Element { cause, .. } => {
                Some(cause.as_ref())
            }
            _ => None,
        })
    }

    /// The outermost operation that failed.
    pub fn operation(&self) -> Option<&OpDescriptor> {
        self.chain().find_map(|e| match e {
            ExecutionError::Operation { operation, .. } => Some(operation),
            _ => None,
        })
    }

    /// Index of the outermost collection element that failed.
    pub fn element_index(&self) -> Option<usize> {
        self.chain().find_map(|e| match e {
            ExecutionError::Element { index, .. } => Some(*index),
            _ => None,
        })
    }

    /// The error at the bottom of the wrapping chain.
    pub fn root_cause(&self) -> &ExecutionError {
        self.chain().last().unwrap_or(self)
    }

    pub(crate) fn in_operation(self, operation: &OpDescriptor) -> Self {
        ExecutionError::Operation {
            operation: operation.clone(),
            cause: Box::new(self),
        }
    }

    pub(crate) fn in_element(self, index: usize) -> Self {
        ExecutionError::Element {
            index,
            cause: Box::new(self),
        }
    }
}

/// What a transformer does when invoked.
pub(crate) enum Body {
    /// Hand the source value over as is.
    Identity,
    Convert(Arc<dyn Converter>),
    Object(ObjectBody),
    Collection(CollectionBody),
    /// `Option` on either side; the wrapped pair does the work.
    Nullable(TransformerRef),
    Dynamic(DynamicBody),
}

/// Maps by the runtime type of each source value.
pub(crate) struct DynamicBody {
    pub(crate) cache: Weak<CacheShared>,
    pub(crate) config: MapConfig,
    pub(crate) destination: Ty,
}

impl DynamicBody {
    fn run(
        &self,
        source: &Value,
        destination: Option<Value>,
        state: &MapState<'_>,
    ) -> Result<Value, ExecutionError> {
        let Some(runtime) = source.runtime_ty() else {
            return Ok(Value::Null);
        };
        let target = match &self.destination {
            Ty::Any => runtime.clone(),
            other => other.clone(),
        };
        let shared = self.cache.upgrade().ok_or(ExecutionError::CacheDropped)?;
        let transformer = TransformerCache::from_shared(shared)
            .get_or_compile(&runtime, &target, &self.config)
            .map_err(|cause| ExecutionError::Unresolved {
                from: runtime,
                to: target,
                cause,
            })?;
        transformer.run(source, destination, state)
    }
}

struct TransformerInner {
    source: Ty,
    destination: Ty,
    config: ConfigId,
    shallow: bool,
    null_source: bool,
    body: Body,
}

/// A compiled mapping from one type to another.
///
/// Cloning is cheap and yields the same transformer; transformers are
/// immutable and may be invoked from any number of threads at once.
#[derive(Clone)]
pub struct Transformer(Arc<TransformerInner>);

impl Transformer {
    pub(crate) fn new(source: Ty, destination: Ty, config: ConfigId, body: Body) -> Self {
        let shallow = matches!(body, Body::Identity);
        let null_source = match &body {
            Body::Object(object) => object.handles_null(),
            Body::Collection(collection) => collection.handles_null(),
            _ => false,
        };
        Self(Arc::new(TransformerInner {
            source,
            destination,
            config,
            shallow,
            null_source,
            body,
        }))
    }

    pub fn source(&self) -> &Ty {
        &self.0.source
    }

    pub fn destination(&self) -> &Ty {
        &self.0.destination
    }

    pub fn config_id(&self) -> ConfigId {
        self.0.config
    }

    /// Whether this transformer returns its source unchanged (by reference).
    pub fn is_shallow(&self) -> bool {
        self.0.shallow
    }

    /// Whether a null source produces something other than null.
    pub fn supports_null_source(&self) -> bool {
        self.0.null_source
    }

    /// Whether both handles are the same compiled transformer.
    pub fn ptr_eq(&self, other: &Transformer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Map `source` into a new destination value.
    pub fn map(&self, source: &Value) -> Result<Value, ExecutionError> {
        self.run(source, None, &MapState::none())
    }

    /// Map `source` onto an existing destination instance.
    pub fn map_into(&self, source: &Value, destination: Value) -> Result<Value, ExecutionError> {
        self.run(source, Some(destination), &MapState::none())
    }

    /// Map with an optional destination and caller state.
    ///
    /// A missing or null destination is constructed. Object destinations
    /// are filled in place and returned.
    pub fn map_with(
        &self,
        source: &Value,
        destination: Option<Value>,
        state: &MapState<'_>,
    ) -> Result<Value, ExecutionError> {
        self.run(source, destination, state)
    }

    /// Map every source. Stops at the first failure.
    pub fn map_all<'v, I>(&self, sources: I) -> Result<Vec<Value>, ExecutionError>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let state = MapState::none();
        sources
            .into_iter()
            .map(|source| self.run(source, None, &state))
            .collect()
    }

    /// Map independent sources on the rayon pool.
    #[cfg(feature = "parallel")]
    pub fn par_map_all(&self, sources: &[Value]) -> Result<Vec<Value>, ExecutionError> {
        use rayon::prelude::*;

        sources
            .par_iter()
            .map(|source| self.run(source, None, &MapState::none()))
            .collect()
    }

    pub(crate) fn run(
        &self,
        source: &Value,
        destination: Option<Value>,
        state: &MapState<'_>,
    ) -> Result<Value, ExecutionError> {
        match &self.0.body {
            Body::Identity => Ok(source.clone()),
            Body::Convert(converter) => {
                if source.is_null() {
                    return Ok(Value::Null);
                }
                Ok(converter.convert(source, state)?)
            }
            Body::Object(object) => object.run(source, destination, state),
            Body::Collection(collection) => collection.run(source, state),
            Body::Nullable(inner) => inner.resolve()?.run(source, destination, state),
            Body::Dynamic(dynamic) => dynamic.run(source, destination, state),
        }
    }
}

impl fmt::Debug for Transformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.0.body {
            Body::Identity => "identity",
            Body::Convert(_) => "convert",
            Body::Object(_) => "object",
            Body::Collection(_) => "collection",
            Body::Nullable(_) => "nullable",
            Body::Dynamic(_) => "dynamic",
        };
        f.debug_struct("Transformer")
            .field("source", &self.0.source.to_string())
            .field("destination", &self.0.destination.to_string())
            .field("config", &self.0.config)
            .field("body", &kind)
            .finish()
    }
}
