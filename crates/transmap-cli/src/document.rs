//! Conversion between JSON/YAML documents and mapper values.
//!
//! Documents carry no type information of their own, so reading is guided by
//! the schema type expected at each position. Objects in untyped (`Any`)
//! positions name their type with a `$type` key.

use anyhow::{Context, Result, bail};
use rhi_transmap_core::{ScalarKind, Schema, Ty, Value, named_fields};
use serde::Deserialize;
use serde_json::{Map, Number, Value as Json};

const TYPE_KEY: &str = "$type";

/// Output document format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

/// Parse a JSON or YAML document.
///
/// YAML is a superset of JSON, so both go through the YAML parser.
pub fn parse(data: &[u8]) -> Result<Json> {
    serde_yaml::from_slice(data).context("Failed to parse input document")
}

/// Render a document in the given format.
pub fn render(doc: &Json, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut s = serde_json::to_string_pretty(doc)?;
            s.push('\n');
            Ok(s)
        }
        OutputFormat::Yaml => Ok(serde_yaml::to_string(doc)?),
    }
}

/// Read a document as a value of type `ty`.
pub fn read(schema: &Schema, ty: &Ty, doc: &Json) -> Result<Value> {
    Reader { schema }.read(ty, doc, "$")
}

struct Reader<'a> {
    schema: &'a Schema,
}

impl Reader<'_> {
    fn read(&self, ty: &Ty, doc: &Json, at: &str) -> Result<Value> {
        if doc.is_null() {
            return Ok(Value::Null);
        }
        match ty {
            Ty::Optional(inner) => self.read(inner, doc, at),
            Ty::Scalar(kind) => scalar(*kind, doc, at),
            Ty::Array(element) | Ty::List(element) => {
                let Json::Array(items) = doc else {
                    bail!("Expected a list at {}, found {}", at, kind_of(doc));
                };
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.read(element, item, &format!("{}[{}]", at, i)))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            Ty::Named(name) => self.read_named(name.as_str(), doc, at),
            Ty::Any => self.read_untyped(doc, at),
        }
    }

    fn read_named(&self, name: &str, doc: &Json, at: &str) -> Result<Value> {
        if let Some(desc) = self.schema.enumeration(name) {
            let variant = match doc {
                Json::String(s) => Some(s.as_str()),
                Json::Number(n) => n.as_i64().and_then(|d| desc.by_discriminant(d)),
                _ => None,
            };
            return variant
                .and_then(|v| self.schema.enum_value(name, v))
                .map(Value::Enum)
                .with_context(|| format!("No variant of `{}` matches {} at {}", name, doc, at));
        }

        let Json::Object(fields) = doc else {
            bail!("Expected a `{}` object at {}, found {}", name, at, kind_of(doc));
        };
        let desc = self.schema.get(name).with_context(|| format!("Unknown type `{}` at {}", name, at))?;
        let object = desc
            .as_object()
            .with_context(|| format!("`{}` is not an object type", name))?;

        let mut builder = self.schema.build(name)?;
        for (key, field) in fields {
            if key == TYPE_KEY {
                continue;
            }
            let Some((_, member)) = object.member(key) else {
                bail!("`{}` has no member `{}` (at {})", name, key, at);
            };
            let value = self.read(&member.ty, field, &format!("{}.{}", at, key))?;
            builder = builder.set(key, value);
        }
        Ok(builder.into_value())
    }

    fn read_untyped(&self, doc: &Json, at: &str) -> Result<Value> {
        match doc {
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| self.read_untyped(item, &format!("{}[{}]", at, i)))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Json::Object(fields) => {
                let Some(Json::String(name)) = fields.get(TYPE_KEY) else {
                    bail!("Untyped object at {} needs a `{}` key", at, TYPE_KEY);
                };
                self.read_named(name, doc, at)
            }
            other => plain_scalar(other).with_context(|| format!("Unsupported value at {}", at)),
        }
    }
}

fn scalar(kind: ScalarKind, doc: &Json, at: &str) -> Result<Value> {
    plain_scalar(doc)
        .and_then(|value| kind.coerce(&value))
        .with_context(|| format!("Expected {} at {}, found {}", kind, at, doc))
}

fn plain_scalar(doc: &Json) -> Option<Value> {
    match doc {
        Json::Bool(b) => Some(Value::Bool(*b)),
        Json::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_u64().map(Value::UInt))
            .or_else(|| n.as_f64().map(Value::Float)),
        Json::String(s) => Some(Value::String(s.clone())),
        _ => None,
    }
}

fn kind_of(doc: &Json) -> &'static str {
    match doc {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "a list",
        Json::Object(_) => "an object",
    }
}

/// Write a value as a document. Enums are written as variant names; objects
/// list their members in declaration order.
pub fn write(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) => Json::from(*n),
        Value::UInt(n) => Json::from(*n),
        Value::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
        Value::Char(c) => Json::String(c.to_string()),
        Value::List(items) => Json::Array(items.iter().map(write).collect()),
        Value::Enum(e) => Json::String(e.variant.to_string()),
        Value::Object(obj) => {
            let mut fields = Map::new();
            for (member, field) in named_fields(obj) {
                if member.readable {
                    fields.insert(member.name, write(&field));
                }
            }
            Json::Object(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_transmap_core::TypeDesc;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with(
                TypeDesc::object("Order")
                    .member("id", Ty::u32())
                    .member("status", Ty::named("Status"))
                    .member("tags", Ty::list(Ty::string()))
                    .member("note", Ty::optional(Ty::string()))
                    .member("extra", Ty::Any),
            )
            .unwrap()
            .with(TypeDesc::object("Tag").member("name", Ty::string()))
            .unwrap()
            .with(
                TypeDesc::enumeration("Status", ScalarKind::I32)
                    .variant("Open", 1)
                    .variant("Closed", 2),
            )
            .unwrap()
    }

    #[test]
    fn test_read_guided_by_schema() {
        let schema = schema();
        let doc = json!({
            "id": 7,
            "status": 2,
            "tags": ["a", "b"],
            "extra": {"$type": "Tag", "name": "x"}
        });
        let order = read(&schema, &Ty::named("Order"), &doc).unwrap();

        assert_eq!(order.field("id"), Some(Value::UInt(7)));
        assert_eq!(order.field("status").unwrap().as_enum().unwrap().variant.as_ref(), "Closed");
        assert_eq!(order.field("tags"), Some(Value::from(vec!["a", "b"])));
        assert_eq!(order.field("note"), Some(Value::Null));
        let extra = order.field("extra").unwrap();
        assert_eq!(extra.as_object().unwrap().type_name().as_str(), "Tag");

        assert_eq!(
            write(&order),
            json!({
                "id": 7,
                "status": "Closed",
                "tags": ["a", "b"],
                "note": null,
                "extra": {"name": "x"}
            })
        );
    }

    #[test]
    fn test_read_errors_name_the_position() {
        let schema = schema();
        let err = read(&schema, &Ty::named("Order"), &json!({"tags": ["a", 3]})).unwrap_err();
        assert!(err.to_string().contains("$.tags[1]"), "{}", err);

        let err = read(&schema, &Ty::named("Order"), &json!({"id": -1})).unwrap_err();
        assert!(err.to_string().contains("u32"), "{}", err);

        let err = read(&schema, &Ty::named("Order"), &json!({"bogus": 1})).unwrap_err();
        assert!(err.to_string().contains("bogus"), "{}", err);

        let err = read(&schema, &Ty::named("Order"), &json!({"extra": {"name": "x"}})).unwrap_err();
        assert!(err.to_string().contains("$type"), "{}", err);
    }

    #[test]
    fn test_parse_yaml_and_render() {
        let doc = parse(b"id: 3\ntags: [x]\n").unwrap();
        assert_eq!(doc, json!({"id": 3, "tags": ["x"]}));
        assert_eq!(render(&doc, OutputFormat::Yaml).unwrap(), "id: 3\ntags:\n- x\n");
        assert!(render(&doc, OutputFormat::Json).unwrap().ends_with("}\n"));
    }
}
