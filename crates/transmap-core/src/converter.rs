//! Converter declarations and traits.

use crate::types::{ScalarKind, Ty, TypeName};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Declaration of a converter's interface.
///
/// Describes which type pair a converter handles, without containing the
/// conversion logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterDecl {
    /// Unique identifier for this converter.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Type of accepted values.
    pub source: Ty,
    /// Type of produced values.
    pub destination: Ty,
}

impl ConverterDecl {
    /// Create a new converter declaration.
    pub fn new(id: impl Into<String>, source: Ty, destination: Ty) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            source,
            destination,
        }
    }

    /// Declaration with the conventional `from->to` id.
    pub fn pair(source: Ty, destination: Ty) -> Self {
        Self::new(format!("{}->{}", source, destination), source, destination)
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }
}

/// Caller-supplied state threaded through one mapping call.
///
/// Converters, filters and other callbacks receive it untouched; the mapper
/// never inspects it.
#[derive(Clone, Copy, Default)]
pub struct MapState<'a>(Option<&'a (dyn Any + Send + Sync)>);

impl<'a> MapState<'a> {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<T: Any + Send + Sync>(state: &'a T) -> Self {
        Self(Some(state))
    }

    /// Downcast the state to a concrete type.
    pub fn get<T: Any>(&self) -> Option<&'a T> {
        self.0.and_then(|s| s.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for MapState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("MapState(..)"),
            None => f.write_str("MapState(None)"),
        }
    }
}

/// Trait for implementing converters.
///
/// A converter turns a non-null value of its declared source type into a
/// value of its destination type. `Null` never reaches a converter.
pub trait Converter: Send + Sync {
    /// Get the declaration for this converter.
    fn decl(&self) -> &ConverterDecl;

    /// Convert a single value.
    fn convert(&self, value: &Value, state: &MapState<'_>) -> Result<Value, ConvertError>;
}

type ConvertClosure = dyn Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync;

/// A converter backed by a closure.
#[derive(Clone)]
pub struct FnConverter {
    decl: ConverterDecl,
    f: Arc<ConvertClosure>,
}

impl FnConverter {
    pub fn new<F>(decl: ConverterDecl, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        Self {
            decl,
            f: Arc::new(f),
        }
    }
}

impl Converter for FnConverter {
    fn decl(&self) -> &ConverterDecl {
        &self.decl
    }

    fn convert(&self, value: &Value, state: &MapState<'_>) -> Result<Value, ConvertError> {
        (self.f)(value, state)
    }
}

impl fmt::Debug for FnConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConverter").field("id", &self.decl.id).finish()
    }
}

/// Errors that can occur during conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("conversion failed: {0}")]
    Failed(String),

    #[error("value {value} does not fit in {target}")]
    Overflow { value: String, target: ScalarKind },

    #[error("cannot parse {input:?} as {target}")]
    Parse { input: String, target: String },

    #[error("expected {expected}, found {found}")]
    UnexpectedValue { expected: String, found: &'static str },

    #[error("enum `{ty}` has no variant `{variant}`")]
    UnknownVariant { ty: TypeName, variant: String },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ConvertError {
    pub fn unexpected(expected: impl fmt::Display, found: &Value) -> Self {
        ConvertError::UnexpectedValue {
            expected: expected.to_string(),
            found: found.kind_name(),
        }
    }
}
