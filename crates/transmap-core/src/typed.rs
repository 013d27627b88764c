//! Typed access: mapping Rust values through the dynamic model.

use crate::cache::TransformerCache;
use crate::converter::{ConvertError, MapState};
use crate::mapper::Result;
use crate::schema::Schema;
use crate::transformer::{ExecutionError, Transformer};
use crate::types::{ScalarKind, Ty};
use crate::value::Value;
use std::marker::PhantomData;

/// A Rust type with a place in the schema.
///
/// Implemented here for scalars, `String`, `Option<T>` and `Vec<T>`. Structs
/// implement it by building and reading their schema object.
pub trait Mappable: Sized {
    /// The schema type values of `Self` have.
    fn ty() -> Ty;

    fn to_value(&self, schema: &Schema) -> std::result::Result<Value, ConvertError>;

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError>;
}

macro_rules! mappable_int {
    ($($t:ty => $kind:ident),* $(,)?) => {
        $(
            impl Mappable for $t {
                fn ty() -> Ty {
                    Ty::Scalar(ScalarKind::$kind)
                }

                fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
                    Ok(Value::from(*self))
                }

                fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
                    let n = match &value {
                        Value::Int(n) => <$t>::try_from(*n).ok(),
                        Value::UInt(n) => <$t>::try_from(*n).ok(),
                        _ => None,
                    };
                    n.ok_or_else(|| ConvertError::unexpected(ScalarKind::$kind, &value))
                }
            }
        )*
    };
}

mappable_int!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
);

impl Mappable for f64 {
    fn ty() -> Ty {
        Ty::f64()
    }

    fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
        Ok(Value::Float(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        value
            .as_f64()
            .ok_or_else(|| ConvertError::unexpected(ScalarKind::F64, &value))
    }
}

impl Mappable for f32 {
    fn ty() -> Ty {
        Ty::scalar(ScalarKind::F32)
    }

    fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
        Ok(Value::from(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        value
            .as_f64()
            .map(|x| x as f32)
            .ok_or_else(|| ConvertError::unexpected(ScalarKind::F32, &value))
    }
}

impl Mappable for bool {
    fn ty() -> Ty {
        Ty::bool()
    }

    fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
        Ok(Value::Bool(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        value
            .as_bool()
            .ok_or_else(|| ConvertError::unexpected(ScalarKind::Bool, &value))
    }
}

impl Mappable for char {
    fn ty() -> Ty {
        Ty::scalar(ScalarKind::Char)
    }

    fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
        Ok(Value::Char(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        match value {
            Value::Char(c) => Ok(c),
            other => Err(ConvertError::unexpected(ScalarKind::Char, &other)),
        }
    }
}

impl Mappable for String {
    fn ty() -> Ty {
        Ty::string()
    }

    fn to_value(&self, _: &Schema) -> std::result::Result<Value, ConvertError> {
        Ok(Value::String(self.clone()))
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(ConvertError::unexpected(ScalarKind::String, &other)),
        }
    }
}

impl<T: Mappable> Mappable for Option<T> {
    fn ty() -> Ty {
        Ty::optional(T::ty())
    }

    fn to_value(&self, schema: &Schema) -> std::result::Result<Value, ConvertError> {
        match self {
            Some(inner) => inner.to_value(schema),
            None => Ok(Value::Null),
        }
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Mappable> Mappable for Vec<T> {
    fn ty() -> Ty {
        Ty::list(T::ty())
    }

    fn to_value(&self, schema: &Schema) -> std::result::Result<Value, ConvertError> {
        self.iter()
            .map(|item| item.to_value(schema))
            .collect::<std::result::Result<_, _>>()
            .map(Value::List)
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConvertError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(ConvertError::unexpected(T::ty(), &other)),
        }
    }
}

/// A transformer viewed through Rust types.
pub struct TypedMapper<S, D> {
    cache: TransformerCache,
    transformer: Transformer,
    _types: PhantomData<fn(&S) -> D>,
}

impl<S: Mappable, D: Mappable> TypedMapper<S, D> {
    pub(crate) fn new(cache: TransformerCache, transformer: Transformer) -> Self {
        Self {
            cache,
            transformer,
            _types: PhantomData,
        }
    }

    pub fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    pub fn map(&self, source: &S) -> Result<D> {
        self.run(source, None, &MapState::none())
    }

    /// Map onto `destination`'s current values.
    pub fn map_into(&self, source: &S, destination: &D) -> Result<D> {
        let destination = self.value_of(destination)?;
        self.run(source, Some(destination), &MapState::none())
    }

    pub fn map_with_state(&self, source: &S, state: &MapState<'_>) -> Result<D> {
        self.run(source, None, state)
    }

    pub fn map_all(&self, sources: &[S]) -> Result<Vec<D>> {
        sources.iter().map(|source| self.map(source)).collect()
    }

    #[cfg(feature = "parallel")]
    pub fn par_map_all(&self, sources: &[S]) -> Result<Vec<D>>
    where
        S: Sync,
        D: Send,
    {
        use rayon::prelude::*;

        sources.par_iter().map(|source| self.map(source)).collect()
    }

    fn value_of<T: Mappable>(&self, value: &T) -> Result<Value> {
        value
            .to_value(self.cache.schema())
            .map_err(|e| ExecutionError::from(e).into())
    }

    fn run(&self, source: &S, destination: Option<Value>, state: &MapState<'_>) -> Result<D> {
        let source = self.value_of(source)?;
        let mapped = self.transformer.map_with(&source, destination, state)?;
        D::from_value(mapped).map_err(|e| ExecutionError::from(e).into())
    }
}

impl<S, D> Clone for TypedMapper<S, D> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            transformer: self.transformer.clone(),
            _types: PhantomData,
        }
    }
}
