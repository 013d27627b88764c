//! Compilation: turn mapping operations into executable transformers.
//!
//! Operations are lowered into a [`Program`]: a flat list of steps whose
//! member accessors, converters and nested transformers are all resolved up
//! front. Running a program does no lookups by name and no planning.
//!
//! Nested object members always run through the cached transformer of their
//! pair, so a pair maps the same way at the root, as a member and as a
//! collection element.

use crate::cache::{TransformerCache, TransformerRef};
use crate::collection::CollectionBody;
use crate::config::{
    ConvertFn, Factory, FilterFn, GetterFn, MapConfig, PostProcessFn, SetterFn, ValueProvider,
};
use crate::converter::{Converter, MapState};
use crate::operation::{
    Block, CopyComplex, CopySimple, Filters, MappingOperation, OpDescriptor, ReadOnly, WriteOnly,
};
use crate::path::MemberPath;
use crate::planner::{OperationPlanner, PlanError};
use crate::schema::Schema;
use crate::transformer::{Body, DynamicBody, ExecutionError, Transformer};
use crate::types::{Ty, TypeDesc, TypeName};
use crate::value::{ObjectRef, Value};
use std::sync::Arc;

/// Builds transformers, requesting nested pairs from the cache.
pub struct MappingCompiler<'a> {
    cache: &'a TransformerCache,
    config: &'a MapConfig,
}

impl<'a> MappingCompiler<'a> {
    pub fn new(cache: &'a TransformerCache, config: &'a MapConfig) -> Self {
        Self { cache, config }
    }

    pub(crate) fn schema(&self) -> &'a Schema {
        self.cache.schema()
    }

    /// Build the transformer for any type pair.
    pub fn compile_pair(&self, source: &Ty, destination: &Ty) -> Result<Transformer, PlanError> {
        let body = self.pair_body(source, destination)?;
        Ok(Transformer::new(
            source.clone(),
            destination.clone(),
            self.config.id(),
            body,
        ))
    }

    /// Lower a planned object-to-object operation list.
    ///
    /// Complex members bind to the cached transformer of their pair; any
    /// operations planned inline for them are not lowered.
    pub fn compile(
        &self,
        source: &Ty,
        destination: &Ty,
        ops: Vec<MappingOperation>,
    ) -> Result<Transformer, PlanError> {
        let body = self.object_body(source, destination, ops)?;
        Ok(Transformer::new(
            source.clone(),
            destination.clone(),
            self.config.id(),
            Body::Object(body),
        ))
    }

    fn pair_body(&self, source: &Ty, destination: &Ty) -> Result<Body, PlanError> {
        if let Some(converter) = self.config.converters().get_pair(source, destination) {
            return Ok(Body::Convert(converter));
        }
        if *source == Ty::Any || *destination == Ty::Any {
            return Ok(Body::Dynamic(DynamicBody {
                cache: self.cache.downgrade(),
                config: self.config.clone(),
                destination: destination.clone(),
            }));
        }
        if source.is_optional() || destination.is_optional() {
            let inner = self.request(source.strip_optional(), destination.strip_optional())?;
            return Ok(Body::Nullable(inner));
        }
        if destination.is_sequence() {
            return CollectionBody::compile(self, source, destination).map(Body::Collection);
        }
        if source.is_sequence() {
            return Err(unmappable(source, destination));
        }

        let schema = self.schema();
        if schema.is_object(source) && schema.is_object(destination) {
            if source == destination && self.config.is_shallow(destination) {
                return Ok(Body::Identity);
            }
            let ops = OperationPlanner::new(schema, self.config)
                .deferring()
                .plan(source, destination)?;
            return self.object_body(source, destination, ops).map(Body::Object);
        }

        self.config
            .converters()
            .resolve(source, destination, schema)
            .map(Body::Convert)
            .ok_or_else(|| unmappable(source, destination))
    }

    pub(crate) fn request(&self, source: &Ty, destination: &Ty) -> Result<TransformerRef, PlanError> {
        self.cache.request(source, destination, self.config)
    }

    pub(crate) fn config(&self) -> &'a MapConfig {
        self.config
    }

    fn object_body(
        &self,
        source: &Ty,
        destination: &Ty,
        ops: Vec<MappingOperation>,
    ) -> Result<ObjectBody, PlanError> {
        let source_name = object_name(source)?;
        let destination_name = object_name(destination)?;
        let pair = self
            .config
            .pair_rule(&source_name, &destination_name)
            .unwrap_or_default();

        let construct = match pair.constructor.clone() {
            Some(factory) => Construct::Factory(factory),
            None => self
                .default_construct(&destination_name)?
                .unwrap_or(Construct::Unavailable(Ty::Named(destination_name.clone()))),
        };

        Ok(ObjectBody {
            source: source_name,
            destination: destination_name,
            program: self.lower(ops)?,
            construct,
            null_substitute: pair.null_substitute,
            post_processor: pair.post_processor,
        })
    }

    /// Default construction for an object type, if the mapper may construct
    /// it on its own.
    fn default_construct(&self, name: &TypeName) -> Result<Option<Construct>, PlanError> {
        let schema = self.schema();
        let desc = schema
            .get(name.as_str())
            .ok_or_else(|| PlanError::UnknownType(name.to_string()))?;
        let constructible = desc.as_object().is_some_and(|o| o.constructible);
        if !constructible || !self.config.constructor_mapping() {
            return Ok(None);
        }
        let template = schema
            .instance_template(name.as_str())
            .map_err(|_| PlanError::NotAnObject(Ty::Named(name.clone())))?;
        Ok(Some(Construct::Default {
            desc: desc.clone(),
            template,
        }))
    }

    fn lower(&self, ops: Vec<MappingOperation>) -> Result<Program, PlanError> {
        let steps = ops
            .into_iter()
            .map(|op| self.lower_op(op))
            .collect::<Result<_, _>>()?;
        Ok(Program { steps })
    }

    fn lower_op(&self, op: MappingOperation) -> Result<Step, PlanError> {
        let descriptor = op.descriptor();
        let (filters, action) = match op {
            MappingOperation::CopySimple(copy) => self.lower_copy(copy)?,
            MappingOperation::CopyComplex(copy) => self.lower_complex(copy)?,
            MappingOperation::ReadOnly(ReadOnly {
                source,
                setter,
                filters,
            }) => (filters, Action::ReadOnly { source, setter }),
            MappingOperation::WriteOnly(WriteOnly {
                getter,
                destination,
                filters,
            }) => (
                filters,
                Action::WriteOnly {
                    getter,
                    destination,
                },
            ),
            MappingOperation::Block(Block { ops, filters }) => {
                (filters, Action::Block(self.lower(ops)?))
            }
        };
        Ok(Step {
            descriptor,
            source_filter: filters.source,
            destination_filter: filters.destination,
            action,
        })
    }

    fn lower_copy(&self, copy: CopySimple) -> Result<(Filters, Action), PlanError> {
        let source_ty = copy.source.ty().strip_optional().clone();
        let destination_ty = copy.destination.ty().strip_optional().clone();

        let conversion = if let Some(f) = copy.converter {
            Conversion::User(f)
        } else if copy.shallow && source_ty == destination_ty {
            Conversion::Identity
        } else if let Some(converter) =
            self.config
                .converters()
                .resolve(&source_ty, &destination_ty, self.schema())
        {
            Conversion::Registered(converter)
        } else {
            Conversion::Nested(self.request(&source_ty, &destination_ty)?)
        };

        Ok((
            copy.filters,
            Action::Copy {
                source: copy.source,
                destination: copy.destination,
                conversion,
                null_substitute: copy.null_substitute,
                post_processor: copy.post_processor,
            },
        ))
    }

    fn lower_complex(&self, copy: CopyComplex) -> Result<(Filters, Action), PlanError> {
        if let Some(converter) = copy.converter {
            return self.lower_copy(CopySimple {
                source: copy.source,
                destination: copy.destination,
                converter: Some(converter),
                null_substitute: copy.null_substitute,
                post_processor: copy.post_processor,
                shallow: false,
                filters: copy.filters,
            });
        }

        let source_ty = copy.source.ty().strip_optional().clone();
        let destination_ty = copy.destination.ty().strip_optional().clone();
        let destination_name = object_name(&destination_ty)?;
        let source_name = object_name(&source_ty)?;

        let pair_constructor = self
            .config
            .pair_rule(&source_name, &destination_name)
            .and_then(|rule| rule.constructor);
        let construct = match copy.target_constructor.or(pair_constructor) {
            Some(factory) => Construct::Factory(factory),
            None => self.default_construct(&destination_name)?.ok_or_else(|| {
                PlanError::NoConstructor {
                    member: Some(copy.destination.to_string()),
                    ty: destination_ty.clone(),
                }
            })?,
        };

        let nested = self.request(&source_ty, &destination_ty)?;

        Ok((
            copy.filters,
            Action::Complex {
                source: copy.source,
                destination: copy.destination,
                nested,
                construct,
                null_substitute: copy.null_substitute,
                post_processor: copy.post_processor,
            },
        ))
    }
}

fn object_name(ty: &Ty) -> Result<TypeName, PlanError> {
    ty.strip_optional()
        .as_named()
        .cloned()
        .ok_or_else(|| PlanError::NotAnObject(ty.clone()))
}

fn unmappable(source: &Ty, destination: &Ty) -> PlanError {
    PlanError::Unmappable {
        from: source.clone(),
        to: destination.clone(),
        member: None,
    }
}

/// How a destination instance comes into being.
pub(crate) enum Construct {
    Factory(Factory),
    Default {
        desc: Arc<TypeDesc>,
        template: Vec<Value>,
    },
    /// Only mapping onto a caller-supplied destination is possible.
    Unavailable(Ty),
}

impl Construct {
    fn build(&self, state: &MapState<'_>) -> Result<Value, ExecutionError> {
        match self {
            Construct::Factory(factory) => Ok(factory(state)?),
            Construct::Default { desc, template } => Ok(Value::Object(ObjectRef::from_parts(
                desc.clone(),
                template.clone(),
            ))),
            Construct::Unavailable(ty) => Err(ExecutionError::DestinationRequired { ty: ty.clone() }),
        }
    }
}

/// Conversion chosen for a simple copy, fixed at compile time.
enum Conversion {
    /// Explicit member converter. Also sees null.
    User(ConvertFn),
    /// Same type, copied by reference.
    Identity,
    Registered(Arc<dyn Converter>),
    /// A transformer for the member pair.
    Nested(TransformerRef),
}

enum Action {
    Copy {
        source: MemberPath,
        destination: MemberPath,
        conversion: Conversion,
        null_substitute: Option<ValueProvider>,
        post_processor: Option<PostProcessFn>,
    },
    Complex {
        source: MemberPath,
        destination: MemberPath,
        nested: TransformerRef,
        construct: Construct,
        null_substitute: Option<ValueProvider>,
        post_processor: Option<PostProcessFn>,
    },
    ReadOnly {
        source: MemberPath,
        setter: SetterFn,
    },
    WriteOnly {
        getter: GetterFn,
        destination: MemberPath,
    },
    Block(Program),
}

struct Step {
    descriptor: OpDescriptor,
    source_filter: Option<FilterFn>,
    destination_filter: Option<FilterFn>,
    action: Action,
}

/// Lowered operations for one object pair.
pub(crate) struct Program {
    steps: Vec<Step>,
}

fn passes(filter: &Option<FilterFn>, value: &Value, state: &MapState<'_>) -> bool {
    filter.as_ref().is_none_or(|f| f(value, state))
}

impl Program {
    /// Run every step against the given source and destination objects.
    fn execute(&self, source: &Value, destination: &Value, state: &MapState<'_>) -> Result<(), ExecutionError> {
        for step in &self.steps {
            match &step.action {
                Action::Block(program) => {
                    if passes(&step.source_filter, source, state)
                        && passes(&step.destination_filter, destination, state)
                    {
                        program.execute(source, destination, state)?;
                    }
                }
                _ => step
                    .execute(source, destination, state)
                    .map_err(|e| e.in_operation(&step.descriptor))?,
            }
        }
        Ok(())
    }
}

impl Step {
    fn execute(&self, source: &Value, destination: &Value, state: &MapState<'_>) -> Result<(), ExecutionError> {
        match &self.action {
            Action::Copy {
                source: from,
                destination: to,
                conversion,
                null_substitute,
                post_processor,
            } => {
                let value = from.read(source)?;
                if !self.filters_pass(&value, || to.read(destination), state)? {
                    return Ok(());
                }
                if value.is_null() {
                    if let Some(substitute) = null_substitute {
                        return to.write(destination, substitute(state));
                    }
                }
                let converted = match conversion {
                    Conversion::User(f) => f(&value, state)?,
                    Conversion::Nested(nested) if value.is_null() => {
                        let nested = nested.resolve()?;
                        if nested.supports_null_source() {
                            nested.run(&value, None, state)?
                        } else {
                            Value::Null
                        }
                    }
                    _ if value.is_null() => Value::Null,
                    Conversion::Identity => value,
                    Conversion::Registered(converter) => converter.convert(&value, state)?,
                    Conversion::Nested(nested) => {
                        let current = to.read(destination)?;
                        let current = (!current.is_null()).then_some(current);
                        nested.resolve()?.run(&value, current, state)?
                    }
                };
                to.write(destination, post_process(post_processor, converted, state)?)
            }
            Action::Complex {
                source: from,
                destination: to,
                nested,
                construct,
                null_substitute,
                post_processor,
            } => {
                let value = from.read(source)?;
                if !self.filters_pass(&value, || to.read(destination), state)? {
                    return Ok(());
                }
                if value.is_null() {
                    let substitute = match null_substitute {
                        Some(f) => f(state),
                        None => nested.resolve()?.run(&value, None, state)?,
                    };
                    return to.write(destination, substitute);
                }
                let target = match to.read(destination)? {
                    existing @ Value::Object(_) => existing,
                    _ => construct.build(state)?,
                };
                let mapped = nested.resolve()?.run(&value, Some(target), state)?;
                to.write(destination, post_process(post_processor, mapped, state)?)
            }
            Action::ReadOnly { source: from, setter } => {
                let value = from.read(source)?;
                if !self.filters_pass(&value, || Ok(destination.clone()), state)? {
                    return Ok(());
                }
                Ok(setter(destination, value, state)?)
            }
            Action::WriteOnly {
                getter,
                destination: to,
            } => {
                if !self.filters_pass(source, || to.read(destination), state)? {
                    return Ok(());
                }
                match getter(source, state)? {
                    Some(value) => to.write(destination, value),
                    None => Ok(()),
                }
            }
            Action::Block(program) => program.execute(source, destination, state),
        }
    }

    /// Evaluate both filters. The destination value is only read when there
    /// is a destination filter.
    fn filters_pass<F>(&self, value: &Value, current: F, state: &MapState<'_>) -> Result<bool, ExecutionError>
    where
        F: FnOnce() -> Result<Value, ExecutionError>,
    {
        if !passes(&self.source_filter, value, state) {
            return Ok(false);
        }
        match &self.destination_filter {
            Some(filter) => Ok(filter(&current()?, state)),
            None => Ok(true),
        }
    }
}

fn post_process(
    post_processor: &Option<PostProcessFn>,
    value: Value,
    state: &MapState<'_>,
) -> Result<Value, ExecutionError> {
    match post_processor {
        Some(f) => Ok(f(value, state)?),
        None => Ok(value),
    }
}

/// Transformer body for an object-to-object pair.
pub(crate) struct ObjectBody {
    source: TypeName,
    destination: TypeName,
    program: Program,
    construct: Construct,
    null_substitute: Option<ValueProvider>,
    post_processor: Option<PostProcessFn>,
}

impl ObjectBody {
    pub(crate) fn handles_null(&self) -> bool {
        self.null_substitute.is_some()
    }

    pub(crate) fn run(
        &self,
        source: &Value,
        destination: Option<Value>,
        state: &MapState<'_>,
    ) -> Result<Value, ExecutionError> {
        let source_obj = match source {
            Value::Null => {
                return Ok(self
                    .null_substitute
                    .as_ref()
                    .map_or(Value::Null, |f| f(state)));
            }
            Value::Object(obj) => obj,
            other => return Err(mismatch(&self.source, other.kind_name())),
        };
        let found = source_obj.type_name();
        if found != self.source {
            return Err(mismatch(&self.source, found.as_str()));
        }

        let target = match destination {
            Some(Value::Object(obj)) => {
                let found = obj.type_name();
                if found != self.destination {
                    return Err(mismatch(&self.destination, found.as_str()));
                }
                Value::Object(obj)
            }
            None | Some(Value::Null) => self.construct.build(state)?,
            Some(other) => return Err(mismatch(&self.destination, other.kind_name())),
        };

        self.program.execute(source, &target, state)?;
        post_process(&self.post_processor, target, state)
    }
}

fn mismatch(expected: &TypeName, found: &str) -> ExecutionError {
    ExecutionError::TypeMismatch {
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemberRule, PairRule, RuleScope};
    use crate::converter::ConvertError;
    use crate::types::{ScalarKind, TypeDesc};
    use crate::value::ObjectBuilder;

    fn schema() -> Schema {
        Schema::new()
            .with(
                TypeDesc::object("Src")
                    .member("n1", Ty::i32())
                    .member("str1", Ty::string())
                    .member("addr", Ty::optional(Ty::named("Addr")))
                    .member("items", Ty::list(Ty::i32())),
            )
            .unwrap()
            .with(
                TypeDesc::object("Dst")
                    .member("n1", Ty::i64())
                    .member_default("str1", Ty::string(), "unset")
                    .member("addr", Ty::optional(Ty::named("AddrDto")))
                    .member("items", Ty::list(Ty::string()))
                    .member_default("extra", Ty::scalar(ScalarKind::U8), 7),
            )
            .unwrap()
            .with(TypeDesc::object("Addr").member("city", Ty::string()))
            .unwrap()
            .with(TypeDesc::object("AddrDto").member("city", Ty::string()))
            .unwrap()
            .with(
                TypeDesc::object("Locked")
                    .member("city", Ty::string())
                    .abstract_type(),
            )
            .unwrap()
            .with(
                TypeDesc::object("Holder").member("addr", Ty::optional(Ty::named("Locked"))),
            )
            .unwrap()
            .with(TypeDesc::object("SrcHolder").member("addr", Ty::named("Addr")))
            .unwrap()
    }

    fn source(schema: &Schema, addr: Value) -> Value {
        schema
            .build("Src")
            .unwrap()
            .set("n1", 1)
            .set("str1", "a")
            .set("addr", addr)
            .set("items", vec![1i32, 2, 3])
            .into_value()
    }

    fn build(cache: &TransformerCache, name: &str) -> ObjectBuilder {
        cache.schema().build(name).unwrap()
    }

    fn compile(cache: &TransformerCache, config: &MapConfig, from: &str, to: &str) -> Transformer {
        cache
            .get_or_compile(&Ty::named(from), &Ty::named(to), config)
            .unwrap()
    }

    #[test]
    fn test_object_copy() {
        let schema = schema();
        let addr = schema.build("Addr").unwrap().set("city", "Lyon").into_value();
        let src = source(&schema, addr);
        let cache = TransformerCache::new(schema);
        let config = MapConfig::default();

        let out = compile(&cache, &config, "Src", "Dst").map(&src).unwrap();
        assert_eq!(out.field("n1"), Some(Value::Int(1)));
        assert_eq!(out.field("str1"), Some(Value::from("a")));
        assert_eq!(out.field("addr").unwrap().field("city"), Some(Value::from("Lyon")));
        assert_eq!(
            out.field("items"),
            Some(Value::from(vec!["1", "2", "3"]))
        );
        // Unmapped member keeps its default.
        assert_eq!(out.field("extra"), Some(Value::UInt(7)));
    }

    #[test]
    fn test_null_member_stays_null() {
        let schema = schema();
        let src = source(&schema, Value::Null);
        let cache = TransformerCache::new(schema);
        let config = MapConfig::default();

        let out = compile(&cache, &config, "Src", "Dst").map(&src).unwrap();
        assert_eq!(out.field("addr"), Some(Value::Null));
    }

    #[test]
    fn test_null_source() {
        let cache = TransformerCache::new(schema());
        let config = MapConfig::default();
        let t = compile(&cache, &config, "Src", "Dst");
        assert_eq!(t.map(&Value::Null).unwrap(), Value::Null);
        assert!(!t.supports_null_source());

        let config = MapConfig::builder()
            .pair_rule(RuleScope::to("Dst"), PairRule::new().null_substitute(|_| Value::from("none")))
            .build();
        let t = compile(&cache, &config, "Src", "Dst");
        assert!(t.supports_null_source());
        assert_eq!(t.map(&Value::Null).unwrap(), Value::from("none"));
    }

    #[test]
    fn test_member_rules_apply() {
        let schema = schema();
        let src = source(&schema, Value::Null);
        let cache = TransformerCache::new(schema);
        let config = MapConfig::builder()
            .member_rule(
                RuleScope::to("Dst"),
                "str1",
                MemberRule::new()
                    .convert(|v, _| Ok(Value::from(v.as_str().unwrap_or_default().to_uppercase())))
                    .post_process(|v, _| Ok(Value::from(format!("<{}>", v.as_str().unwrap_or_default())))),
            )
            .member_rule(
                RuleScope::to("Dst"),
                "n1",
                MemberRule::new().filter_destination(|current, _| current.as_i64() == Some(0)),
            )
            .build();

        let dst = build(&cache, "Dst")
            .set("n1", 5)
            .into_value();
        let out = compile(&cache, &config, "Src", "Dst").map_into(&src, dst.clone()).unwrap();
        assert!(out.as_object().unwrap().ptr_eq(dst.as_object().unwrap()));
        assert_eq!(out.field("str1"), Some(Value::from("<A>")));
        // Destination filter saw 5 and skipped the write.
        assert_eq!(out.field("n1"), Some(Value::Int(5)));
    }

    #[test]
    fn test_no_constructor() {
        let cache = TransformerCache::new(schema());
        let config = MapConfig::default();
        let err = cache
            .get_or_compile(&Ty::named("SrcHolder"), &Ty::named("Holder"), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::NoConstructor { member: Some(ref m), .. } if m == "addr"
        ));

        let config = MapConfig::builder()
            .member_rule(
                RuleScope::to("Holder"),
                "addr",
                MemberRule::new().construct_with(|_| {
                    Err(ConvertError::Failed("no instances today".into()))
                }),
            )
            .build();
        assert!(cache
            .get_or_compile(&Ty::named("SrcHolder"), &Ty::named("Holder"), &config)
            .is_ok());
    }

    #[test]
    fn test_root_without_constructor_needs_destination() {
        let cache = TransformerCache::new(schema());
        let config = MapConfig::builder().constructor_mapping(false).build();
        let t = compile(&cache, &config, "Addr", "AddrDto");
        let src = build(&cache, "Addr").set("city", "Oslo").into_value();
        assert!(matches!(
            t.map(&src),
            Err(ExecutionError::DestinationRequired { .. })
        ));
        let dst = build(&cache, "AddrDto").into_value();
        let out = t.map_into(&src, dst).unwrap();
        assert_eq!(out.field("city"), Some(Value::from("Oslo")));
    }

    #[test]
    fn test_type_mismatch_on_wrong_source() {
        let cache = TransformerCache::new(schema());
        let config = MapConfig::default();
        let t = compile(&cache, &config, "Addr", "AddrDto");
        let wrong = build(&cache, "AddrDto").into_value();
        assert!(matches!(t.map(&wrong), Err(ExecutionError::TypeMismatch { .. })));
        assert!(matches!(t.map(&Value::Int(1)), Err(ExecutionError::TypeMismatch { .. })));
    }

}
