//! Rule profiles: mapping configuration as a data file.
//!
//! A profile lists explicit rules (ignored members, converters, substitutes,
//! filters, renamed sources, shallow/deep overrides) and global flags. It is
//! loaded from JSON, YAML or TOML and applied onto a [`MapConfigBuilder`].
//!
//! ```yaml
//! name: customer-dto
//! null_collections: empty
//! rules:
//!   - rule: ignore
//!     type: CustomerDto
//!     members: [password]
//!   - rule: map_from
//!     type: CustomerDto
//!     member: city
//!     path: address.city
//!   - rule: filter
//!     type: CustomerDto
//!     member: age
//!     predicate: { gte: 18 }
//! ```

use crate::config::{MapConfigBuilder, MemberRule, NullCollections, PairRule, RuleScope};
use crate::converter::MapState;
use crate::format::{self, Format};
use crate::pattern::Predicate;
use crate::schema::Schema;
use crate::types::{Ty, TypeName};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A named set of mapping rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Overrides the builder's global shallow-copy flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shallow_copy: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor_mapping: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub null_collections: Option<NullCollections>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Which side of an operation a filter inspects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterSide {
    #[default]
    Source,
    Destination,
}

/// One profile rule.
///
/// `type` names the destination type and `source` optionally narrows the
/// rule to one source type. Rules without a `member` apply to the whole pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Never map these members. Without `type`, on every type.
    Ignore {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        ty: Option<TypeName>,
        members: Vec<String>,
    },
    /// Convert a member with a registered converter.
    Convert {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<TypeName>,
        member: String,
        converter: String,
    },
    /// Write `value` when the source is null.
    Substitute {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<TypeName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member: Option<String>,
        value: Value,
    },
    /// Only map when `predicate` holds.
    Filter {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<TypeName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        member: Option<String>,
        #[serde(default)]
        on: FilterSide,
        predicate: Predicate,
    },
    /// Read a member from another source path.
    MapFrom {
        #[serde(rename = "type")]
        ty: TypeName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<TypeName>,
        member: String,
        path: String,
    },
    /// Copy these types by reference.
    Shallow { types: Vec<Ty> },
    /// Always map these types recursively.
    Deep { types: Vec<Ty> },
}

/// Errors reading or writing profile files.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to parse profile: {0}")]
    Parse(String),

    #[error("failed to serialize profile: {0}")]
    Serialize(String),
}

/// Errors applying or checking a profile.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown converter `{0}`")]
    UnknownConverter(String),

    #[error("profile refers to unknown type `{0}`")]
    UnknownType(String),

    #[error("profile refers to unknown member `{ty}.{member}`")]
    UnknownMember { ty: TypeName, member: String },
}

fn scope(ty: &TypeName, source: &Option<TypeName>) -> RuleScope {
    match source {
        Some(source) => RuleScope::pair(source.clone(), ty.clone()),
        None => RuleScope::to(ty.clone()),
    }
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parse a profile from bytes, detecting the format from `path`.
    pub fn from_bytes(data: &[u8], path: Option<&str>) -> Result<Self, ProfileError> {
        Format::detect(path).parse(data).map_err(ProfileError::Parse)
    }

    /// Parse a profile from bytes with an explicit format name.
    pub fn from_bytes_format(data: &[u8], format: &str) -> Result<Self, ProfileError> {
        format::parse_named(data, format).map_err(ProfileError::Parse)
    }

    pub fn to_bytes(&self, format: Format) -> Result<Vec<u8>, ProfileError> {
        format.render(self).map_err(ProfileError::Serialize)
    }

    /// Check that every type and member the rules mention exists.
    pub fn check(&self, schema: &Schema) -> Result<(), ConfigError> {
        let known = |ty: &TypeName| -> Result<(), ConfigError> {
            if schema.contains(ty.as_str()) {
                Ok(())
            } else {
                Err(ConfigError::UnknownType(ty.to_string()))
            }
        };
        let member = |ty: &TypeName, member: &str| -> Result<(), ConfigError> {
            known(ty)?;
            // Dotted paths are checked when the pair is planned.
            let head = member.split('.').next().unwrap_or(member);
            match schema.object(ty.as_str()) {
                Some(obj) if obj.member(head).is_some() => Ok(()),
                _ => Err(ConfigError::UnknownMember {
                    ty: ty.clone(),
                    member: member.to_string(),
                }),
            }
        };

        for rule in &self.rules {
            match rule {
                Rule::Ignore { ty: Some(ty), .. } => known(ty)?,
                Rule::Ignore { ty: None, .. } => {}
                Rule::Convert {
                    ty, source, member: m, ..
                }
                | Rule::MapFrom {
                    ty, source, member: m, ..
                } => {
                    source.iter().try_for_each(known)?;
                    member(ty, m)?;
                }
                Rule::Substitute {
                    ty, source, member: m, ..
                }
                | Rule::Filter {
                    ty, source, member: m, ..
                } => {
                    source.iter().try_for_each(known)?;
                    match m {
                        Some(m) => member(ty, m)?,
                        None => known(ty)?,
                    }
                }
                Rule::Shallow { types } | Rule::Deep { types } => {
                    for ty in types {
                        if let Some(name) = ty.strip_optional().as_named() {
                            known(name)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl MapConfigBuilder {
    /// Apply every rule of `profile`, in order.
    pub fn apply_profile(mut self, profile: &Profile) -> Result<Self, ConfigError> {
        debug!(name = ?profile.name, rules = profile.rules.len(), "applying profile");
        if let Some(shallow) = profile.shallow_copy {
            self = self.shallow_copy(shallow);
        }
        if let Some(enabled) = profile.constructor_mapping {
            self = self.constructor_mapping(enabled);
        }
        if let Some(policy) = profile.null_collections {
            self = self.null_collections(policy);
        }
        for rule in &profile.rules {
            self = self.apply_rule(rule)?;
        }
        Ok(self)
    }

    fn apply_rule(self, rule: &Rule) -> Result<Self, ConfigError> {
        Ok(match rule {
            Rule::Ignore { ty: Some(ty), members } => self.ignore(ty.clone(), members.iter().cloned()),
            Rule::Ignore { ty: None, members } => members
                .iter()
                .fold(self, |builder, member| builder.ignore_everywhere(member.clone())),
            Rule::Convert {
                ty,
                source,
                member,
                converter,
            } => {
                let converter = self
                    .converters
                    .get(converter)
                    .ok_or_else(|| ConfigError::UnknownConverter(converter.clone()))?;
                self.member_rule(scope(ty, source), member.clone(), MemberRule::new().converter(converter))
            }
            Rule::Substitute {
                ty,
                source,
                member,
                value,
            } => {
                let value = value.clone();
                match member {
                    Some(member) => {
                        self.member_rule(scope(ty, source), member.clone(), MemberRule::new().substitute(value))
                    }
                    None => self.pair_rule(
                        scope(ty, source),
                        PairRule::new().null_substitute(move |_| value.clone()),
                    ),
                }
            }
            Rule::Filter {
                ty,
                source,
                member,
                on,
                predicate,
            } => {
                let predicate = predicate.clone();
                let test = move |value: &Value, _: &MapState<'_>| predicate.matches(value);
                match (member, on) {
                    (Some(member), FilterSide::Source) => {
                        self.member_rule(scope(ty, source), member.clone(), MemberRule::new().filter_source(test))
                    }
                    (Some(member), FilterSide::Destination) => self.member_rule(
                        scope(ty, source),
                        member.clone(),
                        MemberRule::new().filter_destination(test),
                    ),
                    (None, FilterSide::Source) => {
                        self.pair_rule(scope(ty, source), PairRule::new().filter_source(test))
                    }
                    (None, FilterSide::Destination) => {
                        self.pair_rule(scope(ty, source), PairRule::new().filter_destination(test))
                    }
                }
            }
            Rule::MapFrom {
                ty,
                source,
                member,
                path,
            } => self.member_rule(scope(ty, source), member.clone(), MemberRule::new().map_from(path.clone())),
            Rule::Shallow { types } => types.iter().fold(self, |b, ty| b.shallow(ty.clone())),
            Rule::Deep { types } => types.iter().fold(self, |b, ty| b.deep(ty.clone())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MapConfig;
    use crate::types::TypeDesc;

    const PROFILE: &str = r#"
name: customer
null_collections: empty
rules:
  - rule: ignore
    type: Dto
    members: [secret]
  - rule: ignore
    members: [etag]
  - rule: convert
    type: Dto
    member: id
    converter: i32->String
  - rule: substitute
    type: Dto
    member: name
    value: anonymous
  - rule: filter
    type: Dto
    member: age
    predicate:
      gte: 18
  - rule: map_from
    type: Dto
    source: User
    member: city
    path: address.city
  - rule: shallow
    types: [Address, "Option<Blob>"]
"#;

    fn schema() -> Schema {
        Schema::new()
            .with(TypeDesc::object("User").member("address", Ty::named("Address")))
            .unwrap()
            .with(TypeDesc::object("Address").member("city", Ty::string()))
            .unwrap()
            .with(TypeDesc::object("Blob"))
            .unwrap()
            .with(
                TypeDesc::object("Dto")
                    .member("id", Ty::string())
                    .member("name", Ty::string())
                    .member("age", Ty::i32())
                    .member("city", Ty::string())
                    .member("secret", Ty::string()),
            )
            .unwrap()
    }

    #[test]
    fn test_parse_profile() {
        let profile = Profile::from_bytes(PROFILE.as_bytes(), Some("customer.yaml")).unwrap();
        assert_eq!(profile.name.as_deref(), Some("customer"));
        assert_eq!(profile.null_collections, Some(NullCollections::Empty));
        assert_eq!(profile.rules.len(), 7);
        assert_eq!(
            profile.rules[4],
            Rule::Filter {
                ty: "Dto".into(),
                source: None,
                member: Some("age".into()),
                on: FilterSide::Source,
                predicate: Predicate::Gte(18.0),
            }
        );
        assert_eq!(
            profile.rules[6],
            Rule::Shallow {
                types: vec![Ty::named("Address"), Ty::optional(Ty::named("Blob"))]
            }
        );
        profile.check(&schema()).unwrap();
    }

    #[test]
    fn test_apply_profile() {
        let profile = Profile::from_bytes(PROFILE.as_bytes(), None).unwrap();
        let config = MapConfig::builder().apply_profile(&profile).unwrap().build();
        let (user, dto) = (TypeName::new("User"), TypeName::new("Dto"));

        assert!(config.is_ignored(&user, &dto, "secret"));
        assert!(config.is_ignored(&user, &dto, "etag"));
        assert!(config.is_shallow(&Ty::named("Address")));
        assert!(config.is_shallow(&Ty::optional(Ty::named("Blob"))));
        assert_eq!(config.null_collections(), NullCollections::Empty);

        let state = MapState::none();
        let id = config.member_rule(&user, &dto, "id").unwrap();
        let convert = id.converter.unwrap();
        assert_eq!(convert(&Value::Int(7), &state).unwrap(), Value::from("7"));

        let name = config.member_rule(&user, &dto, "name").unwrap();
        assert_eq!((name.null_substitute.unwrap())(&state), Value::from("anonymous"));

        let age = config.member_rule(&user, &dto, "age").unwrap();
        let filter = age.source_filter.unwrap();
        assert!(filter(&Value::Int(30), &state));
        assert!(!filter(&Value::Int(12), &state));

        let city = config.member_rule(&user, &dto, "city").unwrap();
        assert_eq!(city.map_from.as_deref(), Some("address.city"));
        assert!(config.member_rule(&"Admin".into(), &dto, "city").is_none());
    }

    #[test]
    fn test_unknown_converter() {
        let profile = Profile::new().rule(Rule::Convert {
            ty: "Dto".into(),
            source: None,
            member: "id".into(),
            converter: "nope".into(),
        });
        let err = MapConfig::builder().apply_profile(&profile).err().unwrap();
        assert_eq!(err, ConfigError::UnknownConverter("nope".into()));
    }

    #[test]
    fn test_check_rejects_unknown_names() {
        let schema = schema();
        let profile = Profile::new().rule(Rule::MapFrom {
            ty: "Dto".into(),
            source: None,
            member: "zip".into(),
            path: "address.zip".into(),
        });
        assert!(matches!(profile.check(&schema), Err(ConfigError::UnknownMember { .. })));

        let profile = Profile::new().rule(Rule::Deep {
            types: vec![Ty::named("Missing")],
        });
        assert_eq!(profile.check(&schema), Err(ConfigError::UnknownType("Missing".into())));
    }

    #[test]
    fn test_json_profile() {
        let json = br#"{
            "shallow_copy": true,
            "rules": [
                {"rule": "deep", "types": ["Address"]},
                {"rule": "filter", "type": "Dto", "on": "destination", "predicate": "null"}
            ]
        }"#;
        let profile = Profile::from_bytes(json, Some("rules.json")).unwrap();
        let config = MapConfig::builder().apply_profile(&profile).unwrap().build();
        assert!(config.is_shallow(&Ty::named("Blob")));
        assert!(!config.is_shallow(&Ty::named("Address")));

        let pair = config.pair_rule(&"User".into(), &"Dto".into()).unwrap();
        assert!(pair.has_filters());
        assert!(pair.source_filter.is_none());
    }
}
