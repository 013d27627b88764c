//! Registry for converters.
//!
//! Converters are keyed by the exact (source, destination) type pair they
//! handle. Enum pairs that have no registered converter fall back to a
//! structural conversion derived from the enum descriptors.

use crate::converter::{ConvertError, Converter, ConverterDecl, FnConverter, MapState};
use crate::schema::Schema;
use crate::types::{EnumDesc, ScalarKind, Ty, TypeName};
use crate::value::{EnumValue, Value};
use indexmap::IndexMap;
use std::sync::{Arc, OnceLock};

/// Registry of available converters.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    /// Converters indexed by the type pair they handle.
    by_pair: IndexMap<(Ty, Ty), Arc<dyn Converter>>,
    /// Converters indexed by ID.
    by_id: IndexMap<String, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the builtin scalar conversions.
    pub fn with_builtins() -> Self {
        static BUILTINS: OnceLock<ConverterRegistry> = OnceLock::new();
        BUILTINS
            .get_or_init(|| {
                let mut registry = ConverterRegistry::new();
                for from in ScalarKind::ALL {
                    for to in ScalarKind::ALL {
                        if let Some(conv) = builtin(from, to) {
                            registry.register(conv);
                        }
                    }
                }
                registry
            })
            .clone()
    }

    /// Register a converter with its implementation.
    ///
    /// Replaces any converter previously registered for the same pair.
    pub fn register(&mut self, converter: impl Converter + 'static) {
        self.register_arc(Arc::new(converter));
    }

    pub fn register_arc(&mut self, converter: Arc<dyn Converter>) {
        let decl = converter.decl();
        let pair = (decl.source.clone(), decl.destination.clone());
        self.by_id.insert(decl.id.clone(), converter.clone());
        self.by_pair.insert(pair, converter);
    }

    /// Register a closure for a type pair under the conventional id.
    pub fn register_fn<F>(&mut self, source: Ty, destination: Ty, f: F)
    where
        F: Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.register(FnConverter::new(ConverterDecl::pair(source, destination), f));
    }

    /// Get a converter implementation by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Converter>> {
        self.by_id.get(id).cloned()
    }

    /// Get the converter registered for an exact pair.
    pub fn get_pair(&self, source: &Ty, destination: &Ty) -> Option<Arc<dyn Converter>> {
        self.by_pair
            .get(&(source.clone(), destination.clone()))
            .cloned()
    }

    /// Find a converter for a pair, falling back to structural enum
    /// conversions.
    ///
    /// Callers strip `Option` before asking; optional types are never
    /// registered.
    pub fn resolve(
        &self,
        source: &Ty,
        destination: &Ty,
        schema: &Schema,
    ) -> Option<Arc<dyn Converter>> {
        self.get_pair(source, destination)
            .or_else(|| enum_fallback(source, destination, schema))
    }

    /// Iterate over all declarations.
    pub fn declarations(&self) -> impl Iterator<Item = &ConverterDecl> {
        self.by_pair.values().map(|c| c.decl())
    }

    /// Number of registered converters.
    pub fn len(&self) -> usize {
        self.by_pair.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.by_pair.is_empty()
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("converters", &self.by_id.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn builtin(from: ScalarKind, to: ScalarKind) -> Option<FnConverter> {
    let supported = from == to
        || (from.is_numeric() && to.is_numeric() && !(from.is_float() && to.is_integer()))
        || to == ScalarKind::String
        || (from == ScalarKind::String && to != ScalarKind::String);
    if !supported {
        return None;
    }

    let description = if from == to {
        "copy".to_string()
    } else if from == ScalarKind::String {
        format!("parse {}", to)
    } else if to == ScalarKind::String {
        format!("format {}", from)
    } else if from.widens_to(to) || to.is_float() {
        format!("widen {} to {}", from, to)
    } else {
        format!("checked {} to {}", from, to)
    };
    let decl = ConverterDecl::pair(from.into(), to.into()).description(description);
    Some(FnConverter::new(decl, move |value, _| {
        convert_scalar(value, from, to)
    }))
}

/// Convert a scalar of kind `from` to kind `to`.
pub(crate) fn convert_scalar(
    value: &Value,
    from: ScalarKind,
    to: ScalarKind,
) -> Result<Value, ConvertError> {
    if from == to {
        return to
            .coerce(value)
            .ok_or_else(|| ConvertError::unexpected(to, value));
    }
    if to == ScalarKind::String {
        return format_scalar(value).map(Value::String);
    }
    if from == ScalarKind::String {
        let text = value
            .as_str()
            .ok_or_else(|| ConvertError::unexpected(from, value))?;
        return parse_scalar(text, to);
    }

    match value {
        Value::Int(_) | Value::UInt(_) if to.is_integer() => {
            let n = int_of(value);
            to.int_value(n).ok_or_else(|| ConvertError::Overflow {
                value: n.to_string(),
                target: to,
            })
        }
        Value::Int(_) | Value::UInt(_) | Value::Float(_) if to.is_float() => {
            let x = value.as_f64().unwrap_or_default();
            Ok(Value::Float(round_float(x, to)?))
        }
        other => Err(ConvertError::unexpected(from, other)),
    }
}

fn int_of(value: &Value) -> i128 {
    match value {
        Value::Int(n) => *n as i128,
        Value::UInt(n) => *n as i128,
        _ => 0,
    }
}

fn round_float(x: f64, to: ScalarKind) -> Result<f64, ConvertError> {
    if to != ScalarKind::F32 {
        return Ok(x);
    }
    let narrowed = x as f32;
    if x.is_finite() && narrowed.is_infinite() {
        return Err(ConvertError::Overflow {
            value: x.to_string(),
            target: to,
        });
    }
    Ok(narrowed as f64)
}

fn format_scalar(value: &Value) -> Result<String, ConvertError> {
    match value {
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::UInt(n) => Ok(n.to_string()),
        Value::Float(x) => Ok(x.to_string()),
        Value::Char(c) => Ok(c.to_string()),
        Value::String(s) => Ok(s.clone()),
        other => Err(ConvertError::unexpected("scalar", other)),
    }
}

fn parse_scalar(text: &str, to: ScalarKind) -> Result<Value, ConvertError> {
    let parse_error = || ConvertError::Parse {
        input: text.to_string(),
        target: to.to_string(),
    };
    let trimmed = text.trim();
    match to {
        ScalarKind::Bool => trimmed
            .to_lowercase()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| parse_error()),
        ScalarKind::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Value::Char(c)),
                _ => Err(parse_error()),
            }
        }
        kind if kind.is_integer() => {
            let n = trimmed.parse::<i128>().map_err(|_| parse_error())?;
            kind.int_value(n).ok_or_else(|| ConvertError::Overflow {
                value: n.to_string(),
                target: kind,
            })
        }
        kind if kind.is_float() => {
            let x = trimmed.parse::<f64>().map_err(|_| parse_error())?;
            round_float(x, kind).map(Value::Float)
        }
        _ => Ok(Value::String(text.to_string())),
    }
}

/// Structural conversions involving schema enums.
fn enum_fallback(source: &Ty, destination: &Ty, schema: &Schema) -> Option<Arc<dyn Converter>> {
    let source_enum = named_enum(source, schema);
    let destination_enum = named_enum(destination, schema);
    let decl = ConverterDecl::pair(source.clone(), destination.clone());

    let conv: FnConverter = match (source_enum, destination_enum) {
        (Some((from, _)), Some((to, _))) if from == to => {
            FnConverter::new(decl.description("copy"), |value, _| Ok(value.clone()))
        }
        (Some((from, _)), Some((to, to_desc))) => {
            FnConverter::new(decl.description("by variant name"), move |value, _| {
                let e = expect_enum(value, &from)?;
                enum_by_name(&to, &to_desc, &e.variant)
            })
        }
        (Some((from, _)), None) => match destination.as_scalar()? {
            ScalarKind::String => {
                FnConverter::new(decl.description("variant name"), move |value, _| {
                    let e = expect_enum(value, &from)?;
                    Ok(Value::String(e.variant.to_string()))
                })
            }
            kind if kind.is_integer() => {
                FnConverter::new(decl.description("discriminant"), move |value, _| {
                    let e = expect_enum(value, &from)?;
                    kind.int_value(e.discriminant as i128)
                        .ok_or_else(|| ConvertError::Overflow {
                            value: e.discriminant.to_string(),
                            target: kind,
                        })
                })
            }
            _ => return None,
        },
        (None, Some((to, to_desc))) => match source.as_scalar()? {
            ScalarKind::String => {
                FnConverter::new(decl.description("parse variant name"), move |value, _| {
                    let name = value
                        .as_str()
                        .ok_or_else(|| ConvertError::unexpected("string", value))?;
                    enum_by_name(&to, &to_desc, name.trim())
                })
            }
            kind if kind.is_integer() => {
                FnConverter::new(decl.description("checked discriminant"), move |value, _| {
                    let n = match value {
                        Value::Int(_) | Value::UInt(_) => int_of(value),
                        other => return Err(ConvertError::unexpected(kind, other)),
                    };
                    let variant = i64::try_from(n)
                        .ok()
                        .and_then(|d| to_desc.by_discriminant(d).map(|name| (name, d)));
                    match variant {
                        Some((name, d)) => Ok(Value::Enum(EnumValue::new(to.clone(), name, d))),
                        None => Err(ConvertError::UnknownVariant {
                            ty: to.clone(),
                            variant: n.to_string(),
                        }),
                    }
                })
            }
            _ => return None,
        },
        (None, None) => return None,
    };
    Some(Arc::new(conv))
}

fn named_enum(ty: &Ty, schema: &Schema) -> Option<(TypeName, EnumDesc)> {
    let name = ty.as_named()?;
    let desc = schema.enumeration(name.as_str())?;
    Some((name.clone(), desc.clone()))
}

fn expect_enum<'v>(value: &'v Value, ty: &TypeName) -> Result<&'v EnumValue, ConvertError> {
    value
        .as_enum()
        .filter(|e| &e.ty == ty)
        .ok_or_else(|| ConvertError::unexpected(ty, value))
}

fn enum_by_name(ty: &TypeName, desc: &EnumDesc, name: &str) -> Result<Value, ConvertError> {
    desc.by_name(name)
        .map(|d| Value::Enum(EnumValue::new(ty.clone(), name, d)))
        .ok_or_else(|| ConvertError::UnknownVariant {
            ty: ty.clone(),
            variant: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDesc;

    fn convert(registry: &ConverterRegistry, from: Ty, to: Ty, value: Value) -> Result<Value, ConvertError> {
        let schema = schema();
        let conv = registry.resolve(&from, &to, &schema).unwrap();
        conv.convert(&value, &MapState::none())
    }

    fn schema() -> Schema {
        Schema::new()
            .with(
                TypeDesc::enumeration("Color", ScalarKind::I32)
                    .variant("Red", 1)
                    .variant("Green", 2),
            )
            .unwrap()
            .with(
                TypeDesc::enumeration("Shade", ScalarKind::U8)
                    .variant("Green", 0)
                    .variant("Blue", 1),
            )
            .unwrap()
    }

    #[test]
    fn test_builtin_ids() {
        let registry = ConverterRegistry::with_builtins();
        assert!(registry.get("i32->i64").is_some());
        assert!(registry.get("String->u8").is_some());
        assert!(registry.get("bool->String").is_some());
        assert!(registry.get("f64->i32").is_none());
        assert!(registry.get("bool->i32").is_none());
        assert_eq!(
            registry.get("u8->u16").unwrap().decl().destination,
            Ty::scalar(ScalarKind::U16)
        );
    }

    #[test]
    fn test_integer_conversions() {
        let registry = ConverterRegistry::with_builtins();
        assert_eq!(
            convert(&registry, Ty::i32(), Ty::i64(), Value::Int(-7)).unwrap(),
            Value::Int(-7)
        );
        assert_eq!(
            convert(&registry, Ty::i64(), Ty::scalar(ScalarKind::U8), Value::Int(255)).unwrap(),
            Value::UInt(255)
        );
        assert!(matches!(
            convert(&registry, Ty::i64(), Ty::scalar(ScalarKind::U8), Value::Int(-1)),
            Err(ConvertError::Overflow { target: ScalarKind::U8, .. })
        ));
        assert_eq!(
            convert(&registry, Ty::i32(), Ty::f64(), Value::Int(3)).unwrap(),
            Value::Float(3.0)
        );
    }

    #[test]
    fn test_string_conversions() {
        let registry = ConverterRegistry::with_builtins();
        assert_eq!(
            convert(&registry, Ty::i32(), Ty::string(), Value::Int(42)).unwrap(),
            Value::from("42")
        );
        assert_eq!(
            convert(&registry, Ty::string(), Ty::i32(), Value::from(" 17 ")).unwrap(),
            Value::Int(17)
        );
        assert_eq!(
            convert(&registry, Ty::string(), Ty::bool(), Value::from("True")).unwrap(),
            Value::Bool(true)
        );
        assert!(matches!(
            convert(&registry, Ty::string(), Ty::i32(), Value::from("x")),
            Err(ConvertError::Parse { .. })
        ));
        assert_eq!(
            convert(&registry, Ty::string(), Ty::scalar(ScalarKind::Char), Value::from("z")).unwrap(),
            Value::Char('z')
        );
    }

    #[test]
    fn test_user_registration_replaces_builtin() {
        let mut registry = ConverterRegistry::with_builtins();
        let before = registry.len();
        registry.register_fn(Ty::i32(), Ty::string(), |v, _| {
            Ok(Value::from(format!("#{}", v.as_i64().unwrap_or_default())))
        });
        assert_eq!(registry.len(), before);
        assert_eq!(
            convert(&registry, Ty::i32(), Ty::string(), Value::Int(5)).unwrap(),
            Value::from("#5")
        );
    }

    #[test]
    fn test_enum_fallbacks() {
        let registry = ConverterRegistry::with_builtins();
        let schema = schema();
        let red = Value::Enum(schema.enum_value("Color", "Red").unwrap());
        let green = Value::Enum(schema.enum_value("Color", "Green").unwrap());

        assert_eq!(
            convert(&registry, Ty::named("Color"), Ty::string(), red.clone()).unwrap(),
            Value::from("Red")
        );
        assert_eq!(
            convert(&registry, Ty::named("Color"), Ty::i64(), red.clone()).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            convert(&registry, Ty::i32(), Ty::named("Color"), Value::Int(2)).unwrap(),
            green.clone()
        );
        assert!(matches!(
            convert(&registry, Ty::i32(), Ty::named("Color"), Value::Int(9)),
            Err(ConvertError::UnknownVariant { .. })
        ));
        assert_eq!(
            convert(&registry, Ty::string(), Ty::named("Color"), Value::from("Green")).unwrap(),
            green.clone()
        );
        assert_eq!(
            convert(&registry, Ty::named("Color"), Ty::named("Shade"), green).unwrap(),
            Value::Enum(schema.enum_value("Shade", "Green").unwrap())
        );
        assert!(matches!(
            convert(&registry, Ty::named("Color"), Ty::named("Shade"), red),
            Err(ConvertError::UnknownVariant { .. })
        ));
        assert!(registry.resolve(&Ty::named("Color"), &Ty::bool(), &schema).is_none());
    }
}
