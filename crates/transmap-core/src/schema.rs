//! The schema: every named type the mapper knows about.

use crate::format::{self, Format};
use crate::types::{EnumDesc, ObjectDesc, Ty, TypeDesc, TypeKind, TypeName};
use crate::value::{EnumValue, ObjectBuilder, ObjectRef, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Errors defining or loading a schema.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SchemaError {
    #[error("type `{0}` is already defined")]
    Duplicate(TypeName),

    #[error("type `{ty}` declares member `{member}` twice")]
    DuplicateMember { ty: TypeName, member: String },

    #[error("enum `{0}` has no variants")]
    EmptyEnum(TypeName),

    #[error("default for `{ty}.{member}` does not fit its type")]
    InvalidDefault { ty: TypeName, member: String },

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("type `{0}` is not an object type")]
    NotAnObject(String),

    #[error("failed to parse schema: {0}")]
    Parse(String),
}

/// On-disk layout of a schema file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    types: Vec<TypeDesc>,
}

/// A set of named type definitions.
///
/// Types may reference each other in any order; references to types that are
/// never defined surface when a mapping involving them is planned.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: IndexMap<TypeName, Arc<TypeDesc>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type definition.
    pub fn define(&mut self, desc: TypeDesc) -> Result<(), SchemaError> {
        if self.types.contains_key(&desc.name) {
            return Err(SchemaError::Duplicate(desc.name));
        }
        let desc = validate(desc)?;
        self.types.insert(desc.name.clone(), Arc::new(desc));
        Ok(())
    }

    /// Builder form of [`define`](Self::define).
    pub fn with(mut self, desc: TypeDesc) -> Result<Self, SchemaError> {
        self.define(desc)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDesc>> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn object(&self, name: &str) -> Option<&ObjectDesc> {
        self.get(name)?.as_object()
    }

    pub fn enumeration(&self, name: &str) -> Option<&EnumDesc> {
        self.get(name)?.as_enum()
    }

    /// Whether `ty` (after stripping `Option`) names an object type.
    pub fn is_object(&self, ty: &Ty) -> bool {
        ty.strip_optional()
            .as_named()
            .is_some_and(|name| self.object(name.as_str()).is_some())
    }

    /// Whether `ty` (after stripping `Option`) names an enum type.
    pub fn is_enum(&self, ty: &Ty) -> bool {
        ty.strip_optional()
            .as_named()
            .is_some_and(|name| self.enumeration(name.as_str()).is_some())
    }

    pub fn types(&self) -> impl Iterator<Item = &Arc<TypeDesc>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The value a freshly constructed member of type `ty` starts with.
    pub fn default_value(&self, ty: &Ty) -> Value {
        match ty {
            Ty::Scalar(kind) => kind.default_value(),
            Ty::Array(_) | Ty::List(_) => Value::List(Vec::new()),
            Ty::Named(name) => match self.enumeration(name.as_str()) {
                Some(e) => first_variant(name, e),
                None => Value::Null,
            },
            Ty::Optional(_) | Ty::Any => Value::Null,
        }
    }

    /// Initial field values for a new instance of an object type.
    pub fn instance_template(&self, name: &str) -> Result<Vec<Value>, SchemaError> {
        let obj = self
            .get(name)
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))?
            .as_object()
            .ok_or_else(|| SchemaError::NotAnObject(name.to_string()))?;
        Ok(obj
            .members
            .iter()
            .map(|member| match &member.default {
                Some(default) => self.resolve_default(&member.ty, default),
                None => self.default_value(&member.ty),
            })
            .collect())
    }

    /// Start building an instance of an object type.
    pub fn build(&self, name: &str) -> Result<ObjectBuilder, SchemaError> {
        let template = self.instance_template(name)?;
        let desc = self
            .get(name)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownType(name.to_string()))?;
        Ok(ObjectBuilder::new(desc, template))
    }

    /// Construct a default instance of an object type.
    pub fn instantiate(&self, name: &str) -> Result<ObjectRef, SchemaError> {
        self.build(name).map(ObjectBuilder::build)
    }

    /// Build the value of an enum variant by name.
    pub fn enum_value(&self, ty: &str, variant: &str) -> Option<EnumValue> {
        let desc = self.enumeration(ty)?;
        let discriminant = desc.by_name(variant)?;
        Some(EnumValue::new(TypeName::new(ty), variant, discriminant))
    }

    /// Enum defaults may be written as variant names.
    fn resolve_default(&self, ty: &Ty, default: &Value) -> Value {
        if let (Some(name), Some(variant)) = (ty.strip_optional().as_named(), default.as_str()) {
            if let Some(e) = self.enum_value(name.as_str(), variant) {
                return Value::Enum(e);
            }
        }
        default.clone()
    }

    /// Parse a schema from bytes, detecting the format from `path`.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, SchemaError> {
        let file: SchemaFile = Format::detect(path).parse(data).map_err(SchemaError::Parse)?;
        Self::from_file(file)
    }

    /// Parse a schema from bytes with an explicit format name.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = format::parse_named(data, format).map_err(SchemaError::Parse)?;
        Self::from_file(file)
    }

    /// Serialize the schema in the given format.
    pub fn to_bytes(&self, format: Format) -> Result<Vec<u8>, SchemaError> {
        let file = SchemaFile {
            types: self.types.values().map(|d| (**d).clone()).collect(),
        };
        format.render(&file).map_err(SchemaError::Parse)
    }

    fn from_file(file: SchemaFile) -> Result<Self, SchemaError> {
        let mut schema = Self::new();
        for desc in file.types {
            schema.define(desc)?;
        }
        Ok(schema)
    }
}

fn first_variant(name: &TypeName, desc: &EnumDesc) -> Value {
    desc.variants
        .first()
        .map(|(variant, d)| Value::Enum(EnumValue::new(name.clone(), variant.as_str(), *d)))
        .unwrap_or(Value::Null)
}

/// Check a definition and normalize scalar defaults.
fn validate(mut desc: TypeDesc) -> Result<TypeDesc, SchemaError> {
    let name = desc.name.clone();
    match &mut desc.kind {
        TypeKind::Enum(e) => {
            if e.variants.is_empty() {
                return Err(SchemaError::EmptyEnum(name));
            }
        }
        TypeKind::Object(obj) => {
            let mut seen = HashSet::new();
            for member in &mut obj.members {
                if !seen.insert(member.name.clone()) {
                    return Err(SchemaError::DuplicateMember {
                        ty: name,
                        member: member.name.clone(),
                    });
                }
                let kind = member.ty.strip_optional().as_scalar();
                if let (Some(kind), Some(default)) = (kind, &member.default) {
                    if default.is_null() {
                        continue;
                    }
                    let coerced = kind.coerce(default).ok_or_else(|| SchemaError::InvalidDefault {
                        ty: name.clone(),
                        member: member.name.clone(),
                    })?;
                    member.default = Some(coerced);
                }
            }
        }
    }
    Ok(desc)
}
