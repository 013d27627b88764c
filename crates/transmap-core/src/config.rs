//! Mapping configuration.
//!
//! A [`MapConfig`] is everything the planner and compiler consult besides the
//! schema: ignored members, explicit member rules, pair-level rules, user
//! converters and global copy policy. It is immutable once built and cheap to
//! clone. Its [`ConfigId`] is part of every cache key.

use crate::converter::{ConvertError, Converter, MapState};
use crate::registry::ConverterRegistry;
use crate::types::{Ty, TypeName};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// Per-member value conversion.
pub type ConvertFn =
    Arc<dyn Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync>;
/// Produces a value when the source is null.
pub type ValueProvider = Arc<dyn Fn(&MapState<'_>) -> Value + Send + Sync>;
/// Decides whether an operation runs.
pub type FilterFn = Arc<dyn Fn(&Value, &MapState<'_>) -> bool + Send + Sync>;
/// Rewrites a mapped value before it is written.
pub type PostProcessFn =
    Arc<dyn Fn(Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync>;
/// Creates a destination instance.
pub type Factory = Arc<dyn Fn(&MapState<'_>) -> Result<Value, ConvertError> + Send + Sync>;
/// Computes a destination value from the source root. `None` skips the write.
pub type GetterFn =
    Arc<dyn Fn(&Value, &MapState<'_>) -> Result<Option<Value>, ConvertError> + Send + Sync>;
/// Receives a source value together with the destination root.
pub type SetterFn =
    Arc<dyn Fn(&Value, Value, &MapState<'_>) -> Result<(), ConvertError> + Send + Sync>;

/// Identity of a built configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigId(u64);

impl ConfigId {
    const DEFAULT: ConfigId = ConfigId(0);

    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ConfigId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a null source collection maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullCollections {
    /// Null stays null.
    #[default]
    Propagate,
    /// Null becomes an empty collection.
    Empty,
}

/// Which type pair a rule applies to. A missing source type matches any
/// source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleScope {
    pub source: Option<TypeName>,
    pub destination: TypeName,
}

impl RuleScope {
    /// Rules for `destination` regardless of the source type.
    pub fn to(destination: impl Into<TypeName>) -> Self {
        Self {
            source: None,
            destination: destination.into(),
        }
    }

    /// Rules for one source/destination pair.
    pub fn pair(source: impl Into<TypeName>, destination: impl Into<TypeName>) -> Self {
        Self {
            source: Some(source.into()),
            destination: destination.into(),
        }
    }

    fn applies(&self, source: &TypeName, destination: &TypeName) -> bool {
        &self.destination == destination && self.source.as_ref().is_none_or(|s| s == source)
    }
}

/// Explicit mapping rule for one destination member (or member path).
#[derive(Clone, Default)]
pub struct MemberRule {
    pub map_from: Option<String>,
    pub converter: Option<ConvertFn>,
    pub null_substitute: Option<ValueProvider>,
    pub source_filter: Option<FilterFn>,
    pub destination_filter: Option<FilterFn>,
    pub post_processor: Option<PostProcessFn>,
    pub target_constructor: Option<Factory>,
    pub getter: Option<GetterFn>,
}

impl MemberRule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the value from this source path instead of the same-named member.
    pub fn map_from(mut self, path: impl Into<String>) -> Self {
        self.map_from = Some(path.into());
        self
    }

    pub fn convert<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(f));
        self
    }

    /// Use a registered converter for this member.
    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(Arc::new(move |value: &Value, state: &MapState<'_>| {
            converter.convert(value, state)
        }));
        self
    }

    pub fn null_substitute<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapState<'_>) -> Value + Send + Sync + 'static,
    {
        self.null_substitute = Some(Arc::new(f));
        self
    }

    /// Write a fixed value when the source is null.
    pub fn substitute(self, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.null_substitute(move |_| value.clone())
    }

    /// Add a source-side filter. Multiple filters must all pass.
    pub fn filter_source<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> bool + Send + Sync + 'static,
    {
        self.source_filter = Some(and_filter(self.source_filter.take(), Arc::new(f)));
        self
    }

    /// Add a destination-side filter. Multiple filters must all pass.
    pub fn filter_destination<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> bool + Send + Sync + 'static,
    {
        self.destination_filter = Some(and_filter(self.destination_filter.take(), Arc::new(f)));
        self
    }

    pub fn post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.post_processor = Some(Arc::new(f));
        self
    }

    /// Create the destination member instance with `f`.
    pub fn construct_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.target_constructor = Some(Arc::new(f));
        self
    }

    /// Compute the member from the whole source object.
    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> Result<Option<Value>, ConvertError> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    /// Fields of `other` take precedence; filters combine.
    fn overlay(&self, other: &MemberRule) -> MemberRule {
        MemberRule {
            map_from: other.map_from.clone().or_else(|| self.map_from.clone()),
            converter: other.converter.clone().or_else(|| self.converter.clone()),
            null_substitute: other
                .null_substitute
                .clone()
                .or_else(|| self.null_substitute.clone()),
            source_filter: merge_filters(&self.source_filter, &other.source_filter),
            destination_filter: merge_filters(&self.destination_filter, &other.destination_filter),
            post_processor: other
                .post_processor
                .clone()
                .or_else(|| self.post_processor.clone()),
            target_constructor: other
                .target_constructor
                .clone()
                .or_else(|| self.target_constructor.clone()),
            getter: other.getter.clone().or_else(|| self.getter.clone()),
        }
    }
}

impl fmt::Debug for MemberRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberRule")
            .field("map_from", &self.map_from)
            .field("converter", &self.converter.is_some())
            .field("null_substitute", &self.null_substitute.is_some())
            .field("source_filter", &self.source_filter.is_some())
            .field("destination_filter", &self.destination_filter.is_some())
            .field("post_processor", &self.post_processor.is_some())
            .field("target_constructor", &self.target_constructor.is_some())
            .field("getter", &self.getter.is_some())
            .finish()
    }
}

/// Rules for a whole type pair, applied at the root of its transformer.
#[derive(Clone, Default)]
pub struct PairRule {
    pub null_substitute: Option<ValueProvider>,
    pub constructor: Option<Factory>,
    pub post_processor: Option<PostProcessFn>,
    pub source_filter: Option<FilterFn>,
    pub destination_filter: Option<FilterFn>,
}

impl PairRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn null_substitute<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapState<'_>) -> Value + Send + Sync + 'static,
    {
        self.null_substitute = Some(Arc::new(f));
        self
    }

    pub fn construct_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(f));
        self
    }

    pub fn post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.post_processor = Some(Arc::new(f));
        self
    }

    pub fn filter_source<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> bool + Send + Sync + 'static,
    {
        self.source_filter = Some(and_filter(self.source_filter.take(), Arc::new(f)));
        self
    }

    pub fn filter_destination<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> bool + Send + Sync + 'static,
    {
        self.destination_filter = Some(and_filter(self.destination_filter.take(), Arc::new(f)));
        self
    }

    /// Whether the pair's operations are wrapped in a filtered block.
    pub fn has_filters(&self) -> bool {
        self.source_filter.is_some() || self.destination_filter.is_some()
    }

    fn overlay(&self, other: &PairRule) -> PairRule {
        PairRule {
            null_substitute: other
                .null_substitute
                .clone()
                .or_else(|| self.null_substitute.clone()),
            constructor: other.constructor.clone().or_else(|| self.constructor.clone()),
            post_processor: other
                .post_processor
                .clone()
                .or_else(|| self.post_processor.clone()),
            source_filter: merge_filters(&self.source_filter, &other.source_filter),
            destination_filter: merge_filters(&self.destination_filter, &other.destination_filter),
        }
    }
}

impl fmt::Debug for PairRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairRule")
            .field("null_substitute", &self.null_substitute.is_some())
            .field("constructor", &self.constructor.is_some())
            .field("post_processor", &self.post_processor.is_some())
            .field("source_filter", &self.source_filter.is_some())
            .field("destination_filter", &self.destination_filter.is_some())
            .finish()
    }
}

/// A source value handed to a custom setter on the destination root.
#[derive(Clone)]
pub struct ReadOnlyRule {
    pub scope: RuleScope,
    pub source_path: String,
    pub setter: SetterFn,
}

fn and_filter(existing: Option<FilterFn>, next: FilterFn) -> FilterFn {
    match existing {
        None => next,
        Some(first) => Arc::new(move |value: &Value, state: &MapState<'_>| {
            first(value, state) && next(value, state)
        }),
    }
}

fn merge_filters(general: &Option<FilterFn>, specific: &Option<FilterFn>) -> Option<FilterFn> {
    match (general, specific) {
        (Some(g), Some(s)) => Some(and_filter(Some(g.clone()), s.clone())),
        (g, s) => s.clone().or_else(|| g.clone()),
    }
}

struct ConfigInner {
    id: ConfigId,
    shallow_copy: bool,
    shallow_types: HashSet<Ty>,
    deep_types: HashSet<Ty>,
    constructor_mapping: bool,
    null_collections: NullCollections,
    /// `None` ignores the member on every type.
    ignored: HashSet<(Option<TypeName>, String)>,
    member_rules: IndexMap<(RuleScope, String), MemberRule>,
    pair_rules: IndexMap<RuleScope, PairRule>,
    read_only: Vec<ReadOnlyRule>,
    converters: ConverterRegistry,
}

/// An immutable mapping configuration.
#[derive(Clone)]
pub struct MapConfig {
    inner: Arc<ConfigInner>,
}

impl Default for MapConfig {
    /// The shared default configuration. Every call returns the same
    /// identity, so transformers built with it are shared too.
    fn default() -> Self {
        static DEFAULT: OnceLock<MapConfig> = OnceLock::new();
        DEFAULT
            .get_or_init(|| MapConfigBuilder::new().build_with_id(ConfigId::DEFAULT))
            .clone()
    }
}

impl MapConfig {
    pub fn builder() -> MapConfigBuilder {
        MapConfigBuilder::new()
    }

    pub fn id(&self) -> ConfigId {
        self.inner.id
    }

    /// Whether values of `ty` are copied by reference.
    pub fn is_shallow(&self, ty: &Ty) -> bool {
        let inner = &*self.inner;
        let stripped = ty.strip_optional();
        if inner.deep_types.contains(ty) || inner.deep_types.contains(stripped) {
            return false;
        }
        if inner.shallow_types.contains(ty) || inner.shallow_types.contains(stripped) {
            return true;
        }
        inner.shallow_copy
    }

    pub fn constructor_mapping(&self) -> bool {
        self.inner.constructor_mapping
    }

    pub fn null_collections(&self) -> NullCollections {
        self.inner.null_collections
    }

    /// Whether `member` must never be mapped between these types.
    pub fn is_ignored(&self, source: &TypeName, destination: &TypeName, member: &str) -> bool {
        let ignored = &self.inner.ignored;
        let key = |ty: Option<&TypeName>| (ty.cloned(), member.to_string());
        ignored.contains(&key(None))
            || ignored.contains(&key(Some(destination)))
            || ignored.contains(&key(Some(source)))
    }

    /// The effective rule for one destination member. Pair-scoped rules
    /// override destination-scoped ones field by field.
    pub fn member_rule(
        &self,
        source: &TypeName,
        destination: &TypeName,
        member: &str,
    ) -> Option<MemberRule> {
        let general = self
            .inner
            .member_rules
            .get(&(RuleScope::to(destination.clone()), member.to_string()));
        let specific = self.inner.member_rules.get(&(
            RuleScope::pair(source.clone(), destination.clone()),
            member.to_string(),
        ));
        match (general, specific) {
            (Some(g), Some(s)) => Some(g.overlay(s)),
            (g, s) => s.or(g).cloned(),
        }
    }

    /// Rules whose destination is a multi-segment path, in configuration
    /// order.
    pub fn path_rules(&self, source: &TypeName, destination: &TypeName) -> Vec<(String, MemberRule)> {
        let mut rules: Vec<(String, MemberRule)> = Vec::new();
        for ((scope, path), rule) in &self.inner.member_rules {
            if !path.contains('.') || !scope.applies(source, destination) {
                continue;
            }
            match rules.iter_mut().find(|(p, _)| p == path) {
                Some((_, existing)) => *existing = existing.overlay(rule),
                None => rules.push((path.clone(), rule.clone())),
            }
        }
        rules
    }

    /// The effective pair rule for a source/destination pair.
    pub fn pair_rule(&self, source: &TypeName, destination: &TypeName) -> Option<PairRule> {
        let general = self.inner.pair_rules.get(&RuleScope::to(destination.clone()));
        let specific = self
            .inner
            .pair_rules
            .get(&RuleScope::pair(source.clone(), destination.clone()));
        match (general, specific) {
            (Some(g), Some(s)) => Some(g.overlay(s)),
            (g, s) => s.or(g).cloned(),
        }
    }

    /// Custom-setter operations for a pair, in configuration order.
    pub fn read_only_rules(&self, source: &TypeName, destination: &TypeName) -> Vec<&ReadOnlyRule> {
        self.inner
            .read_only
            .iter()
            .filter(|r| r.scope.applies(source, destination))
            .collect()
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.inner.converters
    }
}

impl fmt::Debug for MapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &*self.inner;
        f.debug_struct("MapConfig")
            .field("id", &inner.id)
            .field("shallow_copy", &inner.shallow_copy)
            .field("constructor_mapping", &inner.constructor_mapping)
            .field("null_collections", &inner.null_collections)
            .field("member_rules", &inner.member_rules.len())
            .field("converters", &inner.converters.len())
            .finish()
    }
}

/// Builder for [`MapConfig`].
pub struct MapConfigBuilder {
    shallow_copy: bool,
    shallow_types: HashSet<Ty>,
    deep_types: HashSet<Ty>,
    constructor_mapping: bool,
    null_collections: NullCollections,
    ignored: HashSet<(Option<TypeName>, String)>,
    member_rules: IndexMap<(RuleScope, String), MemberRule>,
    pair_rules: IndexMap<RuleScope, PairRule>,
    read_only: Vec<ReadOnlyRule>,
    pub(crate) converters: ConverterRegistry,
}

impl Default for MapConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MapConfigBuilder {
    /// Deep copy, constructor mapping on, null collections propagate,
    /// builtin converters.
    pub fn new() -> Self {
        Self {
            shallow_copy: false,
            shallow_types: HashSet::new(),
            deep_types: HashSet::new(),
            constructor_mapping: true,
            null_collections: NullCollections::default(),
            ignored: HashSet::new(),
            member_rules: IndexMap::new(),
            pair_rules: IndexMap::new(),
            read_only: Vec::new(),
            converters: ConverterRegistry::with_builtins(),
        }
    }

    /// Copy every complex value by reference unless overridden per type.
    pub fn shallow_copy(mut self, shallow: bool) -> Self {
        self.shallow_copy = shallow;
        self
    }

    /// Copy values of `ty` by reference.
    pub fn shallow(mut self, ty: Ty) -> Self {
        self.deep_types.remove(&ty);
        self.shallow_types.insert(ty);
        self
    }

    /// Always map values of `ty` recursively.
    pub fn deep(mut self, ty: Ty) -> Self {
        self.shallow_types.remove(&ty);
        self.deep_types.insert(ty);
        self
    }

    /// Whether the mapper may construct destination instances itself.
    pub fn constructor_mapping(mut self, enabled: bool) -> Self {
        self.constructor_mapping = enabled;
        self
    }

    pub fn null_collections(mut self, policy: NullCollections) -> Self {
        self.null_collections = policy;
        self
    }

    /// Never map these members of `ty`, as source or destination.
    pub fn ignore<I, S>(mut self, ty: impl Into<TypeName>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ty = ty.into();
        for member in members {
            self.ignored.insert((Some(ty.clone()), member.into()));
        }
        self
    }

    /// Never map a member with this name on any type.
    pub fn ignore_everywhere(mut self, member: impl Into<String>) -> Self {
        self.ignored.insert((None, member.into()));
        self
    }

    /// Add a rule for a destination member or dotted member path. Rules for
    /// the same target merge, later settings winning.
    pub fn member_rule(mut self, scope: RuleScope, member: impl Into<String>, rule: MemberRule) -> Self {
        let key = (scope, member.into());
        let merged = match self.member_rules.get(&key) {
            Some(existing) => existing.overlay(&rule),
            None => rule,
        };
        self.member_rules.insert(key, merged);
        self
    }

    pub fn pair_rule(mut self, scope: RuleScope, rule: PairRule) -> Self {
        let merged = match self.pair_rules.get(&scope) {
            Some(existing) => existing.overlay(&rule),
            None => rule,
        };
        self.pair_rules.insert(scope, merged);
        self
    }

    /// Hand the value at `source_path` to `setter` along with the destination
    /// root.
    pub fn read_only<F>(mut self, scope: RuleScope, source_path: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&Value, Value, &MapState<'_>) -> Result<(), ConvertError> + Send + Sync + 'static,
    {
        self.read_only.push(ReadOnlyRule {
            scope,
            source_path: source_path.into(),
            setter: Arc::new(setter),
        });
        self
    }

    /// Register a converter for its declared pair.
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converters.register(converter);
        self
    }

    /// Register a closure converter for a type pair.
    pub fn convert_fn<F>(mut self, source: Ty, destination: Ty, f: F) -> Self
    where
        F: Fn(&Value, &MapState<'_>) -> Result<Value, ConvertError> + Send + Sync + 'static,
    {
        self.converters.register_fn(source, destination, f);
        self
    }

    pub fn build(self) -> MapConfig {
        self.build_with_id(ConfigId::next())
    }

    fn build_with_id(self, id: ConfigId) -> MapConfig {
        MapConfig {
            inner: Arc::new(ConfigInner {
                id,
                shallow_copy: self.shallow_copy,
                shallow_types: self.shallow_types,
                deep_types: self.deep_types,
                constructor_mapping: self.constructor_mapping,
                null_collections: self.null_collections,
                ignored: self.ignored,
                member_rules: self.member_rules,
                pair_rules: self.pair_rules,
                read_only: self.read_only,
                converters: self.converters,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_identity() {
        let a = MapConfig::builder().build();
        let b = MapConfig::builder().build();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
        assert_eq!(MapConfig::default().id(), MapConfig::default().id());
        assert_ne!(MapConfig::default().id(), a.id());
    }

    #[test]
    fn test_shallow_overrides() {
        let config = MapConfig::builder()
            .shallow_copy(true)
            .deep(Ty::named("Address"))
            .build();
        assert!(config.is_shallow(&Ty::named("Customer")));
        assert!(!config.is_shallow(&Ty::named("Address")));
        assert!(!config.is_shallow(&Ty::optional(Ty::named("Address"))));

        let config = MapConfig::builder().shallow(Ty::named("Blob")).build();
        assert!(config.is_shallow(&Ty::named("Blob")));
        assert!(!config.is_shallow(&Ty::named("Customer")));
    }

    #[test]
    fn test_ignore_scopes() {
        let config = MapConfig::builder()
            .ignore("Customer", ["password"])
            .ignore_everywhere("etag")
            .build();
        let (c, d, x) = ("Customer".into(), "CustomerDto".into(), "Other".into());
        assert!(config.is_ignored(&c, &d, "password"));
        assert!(config.is_ignored(&d, &c, "password"));
        assert!(!config.is_ignored(&x, &d, "password"));
        assert!(config.is_ignored(&x, &d, "etag"));
    }

    #[test]
    fn test_member_rule_overlay() {
        let config = MapConfig::builder()
            .member_rule(RuleScope::to("Dto"), "name", MemberRule::new().map_from("full_name").substitute("?"))
            .member_rule(RuleScope::pair("User", "Dto"), "name", MemberRule::new().map_from("nick"))
            .build();

        let rule = config.member_rule(&"User".into(), &"Dto".into(), "name").unwrap();
        assert_eq!(rule.map_from.as_deref(), Some("nick"));
        assert!(rule.null_substitute.is_some());

        let rule = config.member_rule(&"Admin".into(), &"Dto".into(), "name").unwrap();
        assert_eq!(rule.map_from.as_deref(), Some("full_name"));
        assert!(config.member_rule(&"User".into(), &"Dto".into(), "id").is_none());
    }

    #[test]
    fn test_path_rules_in_order() {
        let config = MapConfig::builder()
            .member_rule(RuleScope::to("Dto"), "address.city", MemberRule::new().map_from("city"))
            .member_rule(RuleScope::to("Dto"), "name", MemberRule::new())
            .member_rule(RuleScope::pair("Other", "Dto"), "address.zip", MemberRule::new())
            .member_rule(RuleScope::to("Dto"), "address.street", MemberRule::new())
            .build();

        let rules = config.path_rules(&"User".into(), &"Dto".into());
        let paths: Vec<_> = rules.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, ["address.city", "address.street"]);
    }

    #[test]
    fn test_filters_combine() {
        let rule = MemberRule::new()
            .filter_source(|v, _| !v.is_null())
            .filter_source(|v, _| v.as_i64().is_some_and(|n| n > 0));
        let filter = rule.source_filter.unwrap();
        let state = MapState::none();
        assert!(filter(&Value::Int(1), &state));
        assert!(!filter(&Value::Int(-1), &state));
        assert!(!filter(&Value::Null, &state));
    }
}
