//! Dynamic values: the runtime data model the mapper reads and writes.
//!
//! Scalars and lists are plain values. Objects are shared by reference:
//! cloning an [`ObjectRef`] aliases the same instance, which is what shallow
//! copies and in-place mapping rely on.

use crate::types::{MemberDesc, ScalarKind, Ty, TypeDesc, TypeName};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value.
///
/// `Null` stands for both an absent reference and an empty optional.
/// Only the scalar and list variants take part in serialization; enum and
/// object values are produced by the mapper, never parsed from text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Char(char),
    List(Vec<Value>),
    #[serde(skip)]
    Enum(EnumValue),
    #[serde(skip)]
    Object(ObjectRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(n) => Some(*n),
            Value::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            Value::UInt(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(e) => Some(e),
            _ => None,
        }
    }

    /// Short name of the variant, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Char(_) => "char",
            Value::List(_) => "list",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
        }
    }

    /// The type this value carries at runtime, if it carries one.
    ///
    /// Integers report their widest kind; lists are untyped.
    pub fn runtime_ty(&self) -> Option<Ty> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Ty::Scalar(ScalarKind::Bool)),
            Value::Int(_) => Some(Ty::Scalar(ScalarKind::I64)),
            Value::UInt(_) => Some(Ty::Scalar(ScalarKind::U64)),
            Value::Float(_) => Some(Ty::Scalar(ScalarKind::F64)),
            Value::String(_) => Some(Ty::Scalar(ScalarKind::String)),
            Value::Char(_) => Some(Ty::Scalar(ScalarKind::Char)),
            Value::List(_) => Some(Ty::list(Ty::Any)),
            Value::Enum(e) => Some(Ty::Named(e.ty.clone())),
            Value::Object(obj) => Some(Ty::Named(obj.type_name())),
        }
    }

    /// Look up a field by member name. `None` if this is not an object or the
    /// member does not exist.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.as_object().and_then(|obj| obj.field(name))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_int {
    ($variant:ident: $($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::$variant(n as _)
                }
            }
        )*
    };
}

value_from_int!(Int: i8, i16, i32, i64);
value_from_int!(UInt: u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Float(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

/// A value of a schema-defined enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub ty: TypeName,
    pub variant: Arc<str>,
    pub discriminant: i64,
}

impl EnumValue {
    pub fn new(ty: TypeName, variant: impl Into<Arc<str>>, discriminant: i64) -> Self {
        Self {
            ty,
            variant: variant.into(),
            discriminant,
        }
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.ty, self.variant)
    }
}

/// Errors writing an object field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("`{ty}` has no member `{member}`")]
    UnknownMember { ty: TypeName, member: String },

    #[error("`{ty}` has no field at index {index}")]
    OutOfRange { ty: TypeName, index: usize },
}

/// Storage of one object instance. Fields follow the member order of `desc`.
struct Object {
    desc: Arc<TypeDesc>,
    fields: Vec<Value>,
}

/// Shared handle to an object instance.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<Object>>);

impl ObjectRef {
    /// Create an instance from a descriptor and a full set of field values.
    ///
    /// The caller guarantees `fields` has one entry per member.
    pub(crate) fn from_parts(desc: Arc<TypeDesc>, fields: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(Object { desc, fields })))
    }

    pub fn type_name(&self) -> TypeName {
        self.0.read().desc.name.clone()
    }

    pub fn desc(&self) -> Arc<TypeDesc> {
        self.0.read().desc.clone()
    }

    /// Read the field at a pre-resolved member index.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.read().fields.get(index).cloned()
    }

    /// Write the field at a pre-resolved member index.
    pub fn set(&self, index: usize, value: Value) -> Result<(), FieldError> {
        let mut obj = self.0.write();
        let ty = obj.desc.name.clone();
        match obj.fields.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FieldError::OutOfRange { ty, index }),
        }
    }

    /// Read a field by member name.
    pub fn field(&self, name: &str) -> Option<Value> {
        let obj = self.0.read();
        let index = obj.desc.member_index(name)?;
        obj.fields.get(index).cloned()
    }

    /// Write a field by member name.
    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<(), FieldError> {
        let index = self.0.read().desc.member_index(name);
        match index {
            Some(index) => self.set(index, value.into()),
            None => Err(FieldError::UnknownMember {
                ty: self.type_name(),
                member: name.to_string(),
            }),
        }
    }

    /// Copy of all field values in member order.
    pub fn fields(&self) -> Vec<Value> {
        self.0.read().fields.clone()
    }

    /// Whether both handles point at the same instance.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let (a, b) = (self.0.read(), other.0.read());
        a.desc.name == b.desc.name && a.fields == b.fields
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let obj = self.0.read();
        let members = obj.desc.as_object().map(|o| o.members.as_slice()).unwrap_or(&[]);
        let mut s = f.debug_struct(obj.desc.name.as_str());
        for (member, value) in members.iter().zip(&obj.fields) {
            s.field(&member.name, value);
        }
        s.finish()
    }
}

/// Builder for object instances, starting from the type's default template.
pub struct ObjectBuilder {
    desc: Arc<TypeDesc>,
    fields: Vec<Value>,
}

impl ObjectBuilder {
    pub(crate) fn new(desc: Arc<TypeDesc>, template: Vec<Value>) -> Self {
        Self {
            desc,
            fields: template,
        }
    }

    /// Set a field. Unknown member names are ignored by [`build`](Self::build)
    /// unless checked with [`try_set`](Self::try_set).
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        if let Some(index) = self.desc.member_index(name) {
            self.fields[index] = value.into();
        }
        self
    }

    /// Set a field, failing on unknown member names.
    pub fn try_set(mut self, name: &str, value: impl Into<Value>) -> Result<Self, FieldError> {
        let index = self
            .desc
            .member_index(name)
            .ok_or_else(|| FieldError::UnknownMember {
                ty: self.desc.name.clone(),
                member: name.to_string(),
            })?;
        self.fields[index] = value.into();
        Ok(self)
    }

    pub fn build(self) -> ObjectRef {
        ObjectRef::from_parts(self.desc, self.fields)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.build())
    }
}

impl fmt::Debug for ObjectBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectBuilder")
            .field("ty", &self.desc.name)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Member descriptors paired with values, for printing and document export.
pub fn named_fields(obj: &ObjectRef) -> Vec<(MemberDesc, Value)> {
    let desc = obj.desc();
    let fields = obj.fields();
    desc.as_object()
        .map(|o| o.members.iter().cloned().zip(fields).collect())
        .unwrap_or_default()
}
