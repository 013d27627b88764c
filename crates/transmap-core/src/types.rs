//! Type descriptors: the static shape of every value the mapper handles.
//!
//! Object and enum types are described once, by name, in a
//! [`Schema`](crate::Schema). [`Ty`] is the structural type used everywhere
//! else: in member descriptors, cache keys and converter tables.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "i8")]
    I8,
    #[serde(rename = "i16")]
    I16,
    #[serde(rename = "i32")]
    I32,
    #[serde(rename = "i64")]
    I64,
    #[serde(rename = "u8")]
    U8,
    #[serde(rename = "u16")]
    U16,
    #[serde(rename = "u32")]
    U32,
    #[serde(rename = "u64")]
    U64,
    #[serde(rename = "f32")]
    F32,
    #[serde(rename = "f64")]
    F64,
    #[serde(rename = "char")]
    Char,
    #[serde(rename = "String")]
    String,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 13] = [
        ScalarKind::Bool,
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
        ScalarKind::F32,
        ScalarKind::F64,
        ScalarKind::Char,
        ScalarKind::String,
    ];

    pub const INTEGERS: [ScalarKind; 8] = [
        ScalarKind::I8,
        ScalarKind::I16,
        ScalarKind::I32,
        ScalarKind::I64,
        ScalarKind::U8,
        ScalarKind::U16,
        ScalarKind::U32,
        ScalarKind::U64,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::I8 => "i8",
            ScalarKind::I16 => "i16",
            ScalarKind::I32 => "i32",
            ScalarKind::I64 => "i64",
            ScalarKind::U8 => "u8",
            ScalarKind::U16 => "u16",
            ScalarKind::U32 => "u32",
            ScalarKind::U64 => "u64",
            ScalarKind::F32 => "f32",
            ScalarKind::F64 => "f64",
            ScalarKind::Char => "char",
            ScalarKind::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn is_integer(self) -> bool {
        self.int_range().is_some()
    }

    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::F32 | ScalarKind::F64)
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Inclusive bounds for integer kinds.
    pub fn int_range(self) -> Option<(i128, i128)> {
        let range = match self {
            ScalarKind::I8 => (i8::MIN as i128, i8::MAX as i128),
            ScalarKind::I16 => (i16::MIN as i128, i16::MAX as i128),
            ScalarKind::I32 => (i32::MIN as i128, i32::MAX as i128),
            ScalarKind::I64 => (i64::MIN as i128, i64::MAX as i128),
            ScalarKind::U8 => (0, u8::MAX as i128),
            ScalarKind::U16 => (0, u16::MAX as i128),
            ScalarKind::U32 => (0, u32::MAX as i128),
            ScalarKind::U64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }

    /// Whether every value of `self` fits in `other` without checks.
    pub fn widens_to(self, other: ScalarKind) -> bool {
        match (self.int_range(), other.int_range()) {
            (Some((lo, hi)), Some((olo, ohi))) => olo <= lo && hi <= ohi,
            _ => self == other,
        }
    }

    pub fn default_value(self) -> Value {
        match self {
            ScalarKind::Bool => Value::Bool(false),
            ScalarKind::I8 | ScalarKind::I16 | ScalarKind::I32 | ScalarKind::I64 => Value::Int(0),
            ScalarKind::U8 | ScalarKind::U16 | ScalarKind::U32 | ScalarKind::U64 => Value::UInt(0),
            ScalarKind::F32 | ScalarKind::F64 => Value::Float(0.0),
            ScalarKind::Char => Value::Char('\0'),
            ScalarKind::String => Value::String(String::new()),
        }
    }

    /// Build the canonical value of this kind from an integer, if it fits.
    pub fn int_value(self, n: i128) -> Option<Value> {
        let (lo, hi) = self.int_range()?;
        if n < lo || n > hi {
            return None;
        }
        if lo < 0 {
            Some(Value::Int(n as i64))
        } else {
            Some(Value::UInt(n as u64))
        }
    }

    /// Normalize a value into this kind's canonical representation.
    ///
    /// Accepts the representations a parsed literal may arrive in (an
    /// unsigned literal for a signed kind, an integer for a float kind, a
    /// one-character string for `char`). Returns `None` if the value does not
    /// fit.
    pub fn coerce(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ScalarKind::Bool, Value::Bool(_)) => Some(value.clone()),
            (kind, Value::Int(n)) if kind.is_integer() => kind.int_value(*n as i128),
            (kind, Value::UInt(n)) if kind.is_integer() => kind.int_value(*n as i128),
            (kind, Value::Float(_) | Value::Int(_) | Value::UInt(_)) if kind.is_float() => {
                value.as_f64().map(Value::Float)
            }
            (ScalarKind::Char, Value::Char(_)) => Some(value.clone()),
            (ScalarKind::Char, Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(Value::Char(c)),
                    _ => None,
                }
            }
            (ScalarKind::String, Value::String(_)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether `value` is already in this kind's canonical representation.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (ScalarKind::Bool, Value::Bool(_)) => true,
            (kind, Value::Int(n)) if kind.is_integer() => kind.int_value(*n as i128).is_some(),
            (kind, Value::UInt(n)) if kind.is_integer() => kind.int_value(*n as i128).is_some(),
            (kind, Value::Float(_)) => kind.is_float(),
            (ScalarKind::Char, Value::Char(_)) => true,
            (ScalarKind::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name of a schema-defined object or enum type.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeName(Arc<str>);

impl TypeName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0.to_string()
    }
}

/// Structural type of a member, collection element or mapping endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Ty {
    Scalar(ScalarKind),
    /// Object or enum defined in the schema.
    Named(TypeName),
    Optional(Box<Ty>),
    /// Fixed-size sequence.
    Array(Box<Ty>),
    /// Growable sequence. `List(Any)` is the untyped list.
    List(Box<Ty>),
    /// Anything; mapped by runtime type.
    Any,
}

impl Ty {
    pub fn scalar(kind: ScalarKind) -> Self {
        Ty::Scalar(kind)
    }

    pub fn named(name: impl Into<TypeName>) -> Self {
        Ty::Named(name.into())
    }

    pub fn optional(inner: Ty) -> Self {
        Ty::Optional(Box::new(inner))
    }

    pub fn list(element: Ty) -> Self {
        Ty::List(Box::new(element))
    }

    pub fn array(element: Ty) -> Self {
        Ty::Array(Box::new(element))
    }

    pub fn bool() -> Self {
        Ty::Scalar(ScalarKind::Bool)
    }

    pub fn i32() -> Self {
        Ty::Scalar(ScalarKind::I32)
    }

    pub fn i64() -> Self {
        Ty::Scalar(ScalarKind::I64)
    }

    pub fn u32() -> Self {
        Ty::Scalar(ScalarKind::U32)
    }

    pub fn f64() -> Self {
        Ty::Scalar(ScalarKind::F64)
    }

    pub fn string() -> Self {
        Ty::Scalar(ScalarKind::String)
    }

    /// Remove every `Option` layer.
    pub fn strip_optional(&self) -> &Ty {
        match self {
            Ty::Optional(inner) => inner.strip_optional(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Ty::Optional(_))
    }

    /// Element type of an array or list.
    pub fn element(&self) -> Option<&Ty> {
        match self {
            Ty::Array(e) | Ty::List(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_sequence(&self) -> bool {
        self.element().is_some()
    }

    pub fn as_named(&self) -> Option<&TypeName> {
        match self {
            Ty::Named(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarKind> {
        match self {
            Ty::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<ScalarKind> for Ty {
    fn from(kind: ScalarKind) -> Self {
        Ty::Scalar(kind)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Scalar(kind) => f.write_str(kind.name()),
            Ty::Named(name) => f.write_str(name.as_str()),
            Ty::Optional(inner) => write!(f, "Option<{inner}>"),
            Ty::Array(inner) => write!(f, "[{inner}]"),
            Ty::List(inner) => write!(f, "Vec<{inner}>"),
            Ty::Any => f.write_str("Any"),
        }
    }
}

/// Error parsing a type expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid type expression `{0}`")]
pub struct TyParseError(pub String);

impl FromStr for Ty {
    type Err = TyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let wrapped = |prefix: &str, suffix: &str| {
            s.strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix(suffix))
        };

        if let Some(inner) = wrapped("Option<", ">") {
            return Ok(Ty::optional(inner.parse()?));
        }
        if let Some(inner) = wrapped("Vec<", ">") {
            return Ok(Ty::list(inner.parse()?));
        }
        if let Some(inner) = wrapped("[", "]") {
            return Ok(Ty::array(inner.parse()?));
        }
        if s == "Any" {
            return Ok(Ty::Any);
        }
        if let Some(kind) = ScalarKind::from_name(s) {
            return Ok(Ty::Scalar(kind));
        }

        let valid_ident = !s.is_empty()
            && !s.starts_with(|c: char| c.is_ascii_digit())
            && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == ':');
        if valid_ident {
            Ok(Ty::named(s))
        } else {
            Err(TyParseError(s.to_string()))
        }
    }
}

impl TryFrom<String> for Ty {
    type Error = TyParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Ty> for String {
    fn from(ty: Ty) -> Self {
        ty.to_string()
    }
}

fn default_true() -> bool {
    true
}

/// One member of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Ty,
    #[serde(default = "default_true")]
    pub readable: bool,
    #[serde(default = "default_true")]
    pub writable: bool,
    /// Value a freshly constructed instance starts with. Falls back to the
    /// type's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl MemberDesc {
    pub fn new(name: impl Into<String>, ty: Ty) -> Self {
        Self {
            name: name.into(),
            ty,
            readable: true,
            writable: true,
            default: None,
        }
    }
}

/// Layout of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDesc {
    pub members: Vec<MemberDesc>,
    /// Whether the mapper may create instances of this type on its own.
    #[serde(default = "default_true")]
    pub constructible: bool,
}

impl ObjectDesc {
    pub fn member(&self, name: &str) -> Option<(usize, &MemberDesc)> {
        self.members
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name)
    }
}

/// An enum type: named discriminants over an integer kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDesc {
    #[serde(default = "default_underlying")]
    pub underlying: ScalarKind,
    pub variants: IndexMap<String, i64>,
}

fn default_underlying() -> ScalarKind {
    ScalarKind::I32
}

impl EnumDesc {
    pub fn by_name(&self, name: &str) -> Option<i64> {
        self.variants.get(name).copied()
    }

    pub fn by_discriminant(&self, discriminant: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, d)| **d == discriminant)
            .map(|(name, _)| name.as_str())
    }
}

/// Kind-specific part of a type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Object(ObjectDesc),
    Enum(EnumDesc),
}

/// A named type definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDesc {
    pub name: TypeName,
    #[serde(flatten)]
    pub kind: TypeKind,
}

impl TypeDesc {
    /// Start an object type with no members.
    pub fn object(name: impl Into<TypeName>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Object(ObjectDesc {
                members: Vec::new(),
                constructible: true,
            }),
        }
    }

    /// Start an enum type with no variants.
    pub fn enumeration(name: impl Into<TypeName>, underlying: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Enum(EnumDesc {
                underlying,
                variants: IndexMap::new(),
            }),
        }
    }

    /// Add a readable, writable member. No-op on enums.
    pub fn member(self, name: impl Into<String>, ty: Ty) -> Self {
        self.with_member(MemberDesc::new(name, ty))
    }

    /// Add a member with an explicit default value.
    pub fn member_default(self, name: impl Into<String>, ty: Ty, default: impl Into<Value>) -> Self {
        let mut member = MemberDesc::new(name, ty);
        member.default = Some(default.into());
        self.with_member(member)
    }

    /// Add a member that can only be read (a computed property).
    pub fn read_only(self, name: impl Into<String>, ty: Ty) -> Self {
        let mut member = MemberDesc::new(name, ty);
        member.writable = false;
        self.with_member(member)
    }

    /// Add a member that can only be written.
    pub fn write_only(self, name: impl Into<String>, ty: Ty) -> Self {
        let mut member = MemberDesc::new(name, ty);
        member.readable = false;
        self.with_member(member)
    }

    pub fn with_member(mut self, member: MemberDesc) -> Self {
        if let TypeKind::Object(obj) = &mut self.kind {
            obj.members.push(member);
        }
        self
    }

    /// Mark an object type as not constructible by the mapper.
    pub fn abstract_type(mut self) -> Self {
        if let TypeKind::Object(obj) = &mut self.kind {
            obj.constructible = false;
        }
        self
    }

    /// Add an enum variant. No-op on objects.
    pub fn variant(mut self, name: impl Into<String>, discriminant: i64) -> Self {
        if let TypeKind::Enum(e) = &mut self.kind {
            e.variants.insert(name.into(), discriminant);
        }
        self
    }

    pub fn as_object(&self) -> Option<&ObjectDesc> {
        match &self.kind {
            TypeKind::Object(obj) => Some(obj),
            TypeKind::Enum(_) => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDesc> {
        match &self.kind {
            TypeKind::Enum(e) => Some(e),
            TypeKind::Object(_) => None,
        }
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.as_object()?.member(name).map(|(index, _)| index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ty_display_and_parse() {
        let cases = [
            Ty::i32(),
            Ty::string(),
            Ty::named("Customer"),
            Ty::optional(Ty::named("Address")),
            Ty::list(Ty::string()),
            Ty::array(Ty::optional(Ty::u32())),
            Ty::list(Ty::Any),
        ];
        for ty in cases {
            let text = ty.to_string();
            assert_eq!(text.parse::<Ty>().unwrap(), ty, "{text}");
        }
        assert_eq!(Ty::list(Ty::Any).to_string(), "Vec<Any>");
        assert!("Vec<1abc>".parse::<Ty>().is_err());
        assert!("".parse::<Ty>().is_err());
    }

    #[test]
    fn test_strip_optional() {
        let ty = Ty::optional(Ty::optional(Ty::named("A")));
        assert_eq!(ty.strip_optional(), &Ty::named("A"));
        assert_eq!(Ty::list(Ty::i32()).element(), Some(&Ty::i32()));
    }

    #[test]
    fn test_scalar_coerce() {
        assert_eq!(ScalarKind::U8.coerce(&Value::Int(5)), Some(Value::UInt(5)));
        assert_eq!(ScalarKind::U8.coerce(&Value::Int(300)), None);
        assert_eq!(ScalarKind::I8.coerce(&Value::Int(-5)), Some(Value::Int(-5)));
        assert_eq!(ScalarKind::F32.coerce(&Value::Int(2)), Some(Value::Float(2.0)));
        assert_eq!(ScalarKind::Char.coerce(&Value::from("x")), Some(Value::Char('x')));
        assert_eq!(ScalarKind::Char.coerce(&Value::from("xy")), None);
    }

    #[test]
    fn test_widening() {
        assert!(ScalarKind::I8.widens_to(ScalarKind::I64));
        assert!(ScalarKind::U8.widens_to(ScalarKind::I16));
        assert!(!ScalarKind::U64.widens_to(ScalarKind::I64));
        assert!(!ScalarKind::I32.widens_to(ScalarKind::U64));
    }

    #[test]
    fn test_type_desc_yaml() {
        let yaml = r#"
name: Customer
kind: object
members:
  - name: id
    type: i32
  - name: tags
    type: Vec<String>
  - name: full_name
    type: String
    writable: false
"#;
        let desc: TypeDesc = serde_yaml::from_str(yaml).unwrap();
        let obj = desc.as_object().unwrap();
        assert_eq!(obj.members.len(), 3);
        assert_eq!(obj.members[1].ty, Ty::list(Ty::string()));
        assert!(!obj.members[2].writable);
        assert!(obj.constructible);
    }
}
