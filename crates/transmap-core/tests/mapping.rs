//! End-to-end mapping scenarios through the public API.

use rhi_transmap_core::{
    ConvertError, Error, ExecutionError, MapConfig, Mapper, MemberRule, NullCollections, OpKind,
    PairRule, PlanError, RuleScope, ScalarKind, Schema, Ty, TypeDesc, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn schema() -> Schema {
    Schema::new()
        .with(
            TypeDesc::object("Source")
                .member("n1", Ty::i32())
                .member("str1", Ty::string())
                .member("addr", Ty::optional(Ty::named("Address")))
                .member("items", Ty::list(Ty::i32()))
                .member("color", Ty::named("Color")),
        )
        .unwrap()
        .with(
            TypeDesc::object("Destination")
                .member("n1", Ty::i32())
                .member("str1", Ty::string())
                .member("addr", Ty::optional(Ty::named("AddressDto")))
                .member("items", Ty::list(Ty::string()))
                .member("color", Ty::string())
                .member_default("untouched", Ty::string(), "default"),
        )
        .unwrap()
        .with(
            TypeDesc::object("Address")
                .member("city", Ty::string())
                .member("zip", Ty::u32()),
        )
        .unwrap()
        .with(
            TypeDesc::object("AddressDto")
                .member("city", Ty::string())
                .member("zip", Ty::string()),
        )
        .unwrap()
        .with(
            TypeDesc::enumeration("Color", ScalarKind::U8)
                .variant("Red", 1)
                .variant("Green", 2),
        )
        .unwrap()
        .with(
            TypeDesc::enumeration("Shade", ScalarKind::I32)
                .variant("Green", 10)
                .variant("Red", 20),
        )
        .unwrap()
}

fn source(schema: &Schema) -> Value {
    let addr = schema
        .build("Address")
        .unwrap()
        .set("city", "Lyon")
        .set("zip", 69001u32)
        .into_value();
    schema
        .build("Source")
        .unwrap()
        .set("n1", 1)
        .set("str1", "a")
        .set("addr", addr)
        .set("items", vec![1, 2, 3])
        .set("color", schema.enum_value("Color", "Green").unwrap())
        .into_value()
}

fn execution(err: Error) -> ExecutionError {
    match err {
        Error::Execution(e) => e,
        other => panic!("expected an execution error, got {:?}", other),
    }
}

fn destination() -> Ty {
    Ty::named("Destination")
}

#[test]
fn test_simple_members_copy() {
    let mapper = Mapper::new(schema());
    let src = source(mapper.schema());
    let out = mapper.map(&src, &destination()).unwrap();

    assert_eq!(out.field("n1"), Some(Value::Int(1)));
    assert_eq!(out.field("str1"), Some(Value::from("a")));
    assert_eq!(out.field("color"), Some(Value::from("Green")));
    assert_eq!(out.field("untouched"), Some(Value::from("default")));

    let addr = out.field("addr").unwrap();
    assert_eq!(addr.field("city"), Some(Value::from("Lyon")));
    assert_eq!(addr.field("zip"), Some(Value::from("69001")));
}

#[test]
fn test_list_elements_converted() {
    let mapper = Mapper::new(schema());
    let out = mapper.map(&source(mapper.schema()), &destination()).unwrap();
    assert_eq!(out.field("items"), Some(Value::from(vec!["1", "2", "3"])));
}

#[test]
fn test_null_member_runs_no_constructor() {
    let built = Arc::new(AtomicUsize::new(0));
    let (counter, member_counter) = (built.clone(), built.clone());
    let schema = schema();
    let config = MapConfig::builder()
        .pair_rule(
            RuleScope::to("AddressDto"),
            PairRule::new().construct_with(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(ConvertError::Failed("unused".into()))
            }),
        )
        .member_rule(
            RuleScope::to("Destination"),
            "addr",
            MemberRule::new().construct_with(move |_| {
                member_counter.fetch_add(1, Ordering::SeqCst);
                Err(ConvertError::Failed("unused".into()))
            }),
        )
        .build();
    let src = source(&schema);
    src.as_object().unwrap().set_field("addr", Value::Null).unwrap();

    let mapper = Mapper::new(schema).with_config(config);
    let out = mapper.map(&src, &destination()).unwrap();
    assert_eq!(out.field("addr"), Some(Value::Null));
    assert_eq!(built.load(Ordering::SeqCst), 0);
}

#[test]
fn test_null_collection_member_follows_policy() {
    let schema = schema();
    let src = source(&schema);
    src.as_object().unwrap().set_field("items", Value::Null).unwrap();

    let mapper = Mapper::new(schema);
    let out = mapper.map(&src, &destination()).unwrap();
    assert_eq!(out.field("items"), Some(Value::Null));

    let empty = mapper.with_config(
        MapConfig::builder()
            .null_collections(NullCollections::Empty)
            .build(),
    );
    let out = empty.map(&src, &destination()).unwrap();
    assert_eq!(out.field("items"), Some(Value::List(Vec::new())));
}

#[test]
fn test_element_failure_leaves_member_unwritten() {
    let schema = schema();
    let config = MapConfig::builder()
        .convert_fn(Ty::i32(), Ty::string(), |value, _| match value.as_i64() {
            Some(2) => Err(ConvertError::Failed("two is not allowed".into())),
            Some(n) => Ok(Value::from(format!("#{}", n))),
            None => Err(ConvertError::unexpected("i32", value)),
        })
        .build();
    let src = source(&schema);
    let existing = schema
        .build("Destination")
        .unwrap()
        .set("items", vec!["kept"])
        .into_value();

    let mapper = Mapper::new(schema).with_config(config);
    let err = mapper.map_into(&src, existing.clone()).unwrap_err();
    let err = execution(err);

    assert_eq!(err.element_index(), Some(1));
    let op = err.operation().unwrap();
    assert_eq!(op.kind, OpKind::CopySimple);
    assert_eq!(op.write_path.as_deref(), Some("items"));
    assert!(matches!(
        err.root_cause(),
        ExecutionError::Convert(ConvertError::Failed(msg)) if msg == "two is not allowed"
    ));
    assert_eq!(existing.field("items"), Some(Value::from(vec!["kept"])));
    // Members before the failing one were already written.
    assert_eq!(existing.field("str1"), Some(Value::from("a")));
}

#[test]
fn test_transformers_are_cached() {
    let mapper = Mapper::new(schema());
    let from = Ty::named("Source");
    let a = mapper.transformer(&from, &destination()).unwrap();
    let b = mapper.transformer(&from, &destination()).unwrap();
    assert!(a.ptr_eq(&b));

    let nested = mapper
        .transformer(&Ty::named("Address"), &Ty::named("AddressDto"))
        .unwrap();
    let again = mapper.clone();
    assert!(
        nested.ptr_eq(
            &again
                .transformer(&Ty::named("Address"), &Ty::named("AddressDto"))
                .unwrap()
        )
    );
}

fn outer_schema() -> Schema {
    schema()
        .with(
            TypeDesc::object("Outer")
                .member("addr", Ty::optional(Ty::named("Address")))
                .member("many", Ty::list(Ty::named("Address"))),
        )
        .unwrap()
        .with(
            TypeDesc::object("OuterDto")
                .member("addr", Ty::optional(Ty::named("AddressDto")))
                .member("many", Ty::list(Ty::named("AddressDto"))),
        )
        .unwrap()
}

fn outer(schema: &Schema, addr: Value) -> Value {
    schema
        .build("Outer")
        .unwrap()
        .set("addr", addr.clone())
        .set("many", Value::List(vec![addr]))
        .into_value()
}

#[test]
fn test_nested_pairs_are_cached() {
    let mapper = Mapper::new(outer_schema());
    let address = Ty::named("Address");
    let address_dto = Ty::named("AddressDto");

    mapper
        .transformer(&Ty::named("Outer"), &Ty::named("OuterDto"))
        .unwrap();
    assert!(mapper.cache().contains(&address, &address_dto, mapper.config()));
    let cached = mapper.cache().len();

    mapper.transformer(&address, &address_dto).unwrap();
    assert_eq!(mapper.cache().len(), cached);
}

#[test]
fn test_pair_post_processor_applies_wherever_the_pair_appears() {
    let config = MapConfig::builder()
        .pair_rule(
            RuleScope::pair("Address", "AddressDto"),
            PairRule::new().post_process(|value, _| {
                if let Some(obj) = value.as_object() {
                    obj.set_field("city", "POST")
                        .map_err(|e| ConvertError::Failed(e.to_string()))?;
                }
                Ok(value)
            }),
        )
        .build();
    let mapper = Mapper::new(outer_schema()).with_config(config);
    let address = source(mapper.schema()).field("addr").unwrap();

    let root = mapper.map(&address, &Ty::named("AddressDto")).unwrap();
    let out = mapper
        .map(&outer(mapper.schema(), address), &Ty::named("OuterDto"))
        .unwrap();
    let member = out.field("addr").unwrap();
    let element = out.field("many").unwrap().as_list().unwrap()[0].clone();

    for mapped in [root, member, element] {
        assert_eq!(mapped.field("city"), Some(Value::from("POST")));
        assert_eq!(mapped.field("zip"), Some(Value::from("69001")));
    }
}

#[test]
fn test_pair_null_substitute_applies_to_members() {
    let placeholder = outer_schema();
    let config = MapConfig::builder()
        .pair_rule(
            RuleScope::pair("Address", "AddressDto"),
            PairRule::new().null_substitute(move |_| {
                placeholder
                    .build("AddressDto")
                    .map(|b| b.set("city", "nowhere").into_value())
                    .unwrap_or(Value::Null)
            }),
        )
        .build();
    let mapper = Mapper::new(outer_schema()).with_config(config);

    let root = mapper
        .transformer(&Ty::named("Address"), &Ty::named("AddressDto"))
        .unwrap()
        .map(&Value::Null)
        .unwrap();
    let out = mapper
        .map(&outer(mapper.schema(), Value::Null), &Ty::named("OuterDto"))
        .unwrap();

    assert_eq!(root.field("city"), Some(Value::from("nowhere")));
    assert_eq!(out.field("addr").unwrap().field("city"), Some(Value::from("nowhere")));
    // Null collection elements stay null.
    assert_eq!(out.field("many"), Some(Value::List(vec![Value::Null])));
}

#[test]
fn test_member_substitute_wins_over_pair_substitute() {
    let config = MapConfig::builder()
        .pair_rule(
            RuleScope::pair("Address", "AddressDto"),
            PairRule::new().null_substitute(|_| Value::from("pair")),
        )
        .member_rule(
            RuleScope::to("OuterDto"),
            "addr",
            MemberRule::new().null_substitute(|_| Value::from("member")),
        )
        .build();
    let mapper = Mapper::new(outer_schema()).with_config(config);
    let out = mapper
        .map(&outer(mapper.schema(), Value::Null), &Ty::named("OuterDto"))
        .unwrap();
    assert_eq!(out.field("addr"), Some(Value::from("member")));
}

#[test]
fn test_mapping_onto_same_destination_is_idempotent() {
    let mapper = Mapper::new(schema());
    let src = source(mapper.schema());
    let dst = mapper.schema().build("Destination").unwrap().into_value();

    mapper.map_into(&src, dst.clone()).unwrap();
    let first = mapper.schema().build("Destination").unwrap().into_value();
    mapper.map_into(&src, first.clone()).unwrap();
    mapper.map_into(&src, dst.clone()).unwrap();
    assert_eq!(dst, first);
}

#[test]
fn test_existing_nested_destination_is_reused() {
    let mapper = Mapper::new(schema());
    let src = source(mapper.schema());
    let addr = mapper.schema().build("AddressDto").unwrap().into_value();
    let dst = mapper
        .schema()
        .build("Destination")
        .unwrap()
        .set("addr", addr.clone())
        .into_value();

    mapper.map_into(&src, dst.clone()).unwrap();
    let written = dst.field("addr").unwrap();
    assert!(written.as_object().unwrap().ptr_eq(addr.as_object().unwrap()));
    assert_eq!(addr.field("city"), Some(Value::from("Lyon")));
}

#[test]
fn test_ignored_members_are_not_mapped() {
    let config = MapConfig::builder()
        .ignore("Destination", ["str1"])
        .ignore_everywhere("zip")
        .build();
    let mapper = Mapper::new(schema()).with_config(config);
    let out = mapper.map(&source(mapper.schema()), &destination()).unwrap();
    assert_eq!(out.field("str1"), Some(Value::from("")));
    assert_eq!(out.field("addr").unwrap().field("zip"), Some(Value::from("")));
}

#[test]
fn test_path_rule_runs_after_structural_copy() {
    let config = MapConfig::builder()
        .member_rule(
            RuleScope::to("Destination"),
            "addr.city",
            MemberRule::new().map_from("str1"),
        )
        .build();
    let mapper = Mapper::new(schema()).with_config(config);
    let plan = mapper.plan(&Ty::named("Source"), &destination()).unwrap();
    assert_eq!(
        plan.last().unwrap().descriptor().to_string(),
        "copy_simple str1 -> addr.city"
    );

    let src = source(mapper.schema());
    let out = mapper.map(&src, &destination()).unwrap();
    assert_eq!(out.field("addr").unwrap().field("city"), Some(Value::from("a")));

    // With no address to write through, the path rule fails.
    src.as_object().unwrap().set_field("addr", Value::Null).unwrap();
    let err = mapper.map(&src, &destination()).unwrap_err();
    let err = execution(err);
    assert!(matches!(
        err.root_cause(),
        ExecutionError::NullIntermediate { path } if path == "addr"
    ));
}

#[test]
fn test_substitutes_and_filters() {
    let config = MapConfig::builder()
        .member_rule(
            RuleScope::to("Destination"),
            "str1",
            MemberRule::new().substitute("n/a"),
        )
        .member_rule(
            RuleScope::pair("Source", "Destination"),
            "n1",
            MemberRule::new().filter_source(|value, _| value.as_i64().is_some_and(|n| n > 10)),
        )
        .build();
    let mapper = Mapper::new(schema()).with_config(config);
    let src = source(mapper.schema());
    src.as_object().unwrap().set_field("str1", Value::Null).unwrap();

    let out = mapper.map(&src, &destination()).unwrap();
    assert_eq!(out.field("str1"), Some(Value::from("n/a")));
    assert_eq!(out.field("n1"), Some(Value::Int(0)));
}

#[test]
fn test_pair_filter_skips_whole_object() {
    let config = MapConfig::builder()
        .pair_rule(
            RuleScope::to("AddressDto"),
            PairRule::new().filter_source(|source, _| {
                source.field("city").and_then(|c| c.as_str().map(|s| s != "Lyon")) == Some(true)
            }),
        )
        .build();
    let mapper = Mapper::new(schema()).with_config(config);
    let out = mapper.map(&source(mapper.schema()), &destination()).unwrap();
    let addr = out.field("addr").unwrap();
    assert_eq!(addr.field("city"), Some(Value::from("")));
}

#[test]
fn test_getter_and_setter() {
    let config = MapConfig::builder()
        .member_rule(
            RuleScope::to("Destination"),
            "untouched",
            MemberRule::new().getter(|source, _| {
                let n = source.field("n1").and_then(|v| v.as_i64()).unwrap_or_default();
                Ok((n > 0).then(|| Value::from(format!("n1={}", n))))
            }),
        )
        .read_only(RuleScope::to("Destination"), "addr.city", |destination, city, _| {
            let upper = city.as_str().unwrap_or_default().to_uppercase();
            let obj = destination
                .as_object()
                .ok_or_else(|| ConvertError::Failed("no destination".into()))?;
            obj.set_field("str1", upper)
                .map_err(|e| ConvertError::Failed(e.to_string()))
        })
        .build();
    let mapper = Mapper::new(schema()).with_config(config);
    let out = mapper.map(&source(mapper.schema()), &destination()).unwrap();
    assert_eq!(out.field("untouched"), Some(Value::from("n1=1")));
    assert_eq!(out.field("str1"), Some(Value::from("LYON")));
}

#[test]
fn test_enum_conversions() {
    let schema = schema();
    let green = Value::Enum(schema.enum_value("Color", "Green").unwrap());
    let mapper = Mapper::new(schema);

    let shade = mapper.map(&green, &Ty::named("Shade")).unwrap();
    assert_eq!(shade.as_enum().unwrap().discriminant, 10);
    assert_eq!(mapper.map(&green, &Ty::i64()).unwrap(), Value::Int(2));
    assert_eq!(mapper.map(&green, &Ty::string()).unwrap(), Value::from("Green"));

    let red = mapper.map(&Value::from("Red"), &Ty::named("Color")).unwrap();
    assert_eq!(red.as_enum().unwrap().variant.as_ref(), "Red");

    let err = mapper.map(&Value::Int(7), &Ty::named("Color")).unwrap_err();
    assert!(matches!(
        err,
        Error::Execution(ExecutionError::Convert(ConvertError::UnknownVariant { .. }))
    ));
}

#[test]
fn test_missing_constructor_is_a_plan_error() {
    let schema = schema()
        .with(TypeDesc::object("Sealed").member("city", Ty::string()).abstract_type())
        .unwrap()
        .with(TypeDesc::object("Holder").member("addr", Ty::named("Sealed")))
        .unwrap()
        .with(TypeDesc::object("HolderSource").member("addr", Ty::named("Address")))
        .unwrap();
    let mapper = Mapper::new(schema);
    let err = mapper
        .transformer(&Ty::named("HolderSource"), &Ty::named("Holder"))
        .unwrap_err();
    assert!(matches!(err, PlanError::NoConstructor { ty, .. } if ty == Ty::named("Sealed")));
}

#[test]
fn test_untyped_members_map_by_runtime_type() {
    let schema = schema()
        .with(TypeDesc::object("Envelope").member("payload", Ty::Any))
        .unwrap();
    let address = source(&schema).field("addr").unwrap();
    let envelope = schema
        .build("Envelope")
        .unwrap()
        .set("payload", address.clone())
        .into_value();

    let mapper = Mapper::new(schema);
    let copy = mapper.map(&envelope, &Ty::named("Envelope")).unwrap();
    let payload = copy.field("payload").unwrap();
    assert_eq!(payload, address);
    assert!(!payload.as_object().unwrap().ptr_eq(address.as_object().unwrap()));

    envelope.as_object().unwrap().set_field("payload", 5).unwrap();
    let copy = mapper.map(&envelope, &Ty::named("Envelope")).unwrap();
    assert_eq!(copy.field("payload"), Some(Value::Int(5)));
}

#[test]
fn test_shallow_copy_shares_instances() {
    let schema = schema()
        .with(
            TypeDesc::object("Wrapper")
                .member("addr", Ty::named("Address"))
                .member("items", Ty::list(Ty::named("Address"))),
        )
        .unwrap();
    let address = source(&schema).field("addr").unwrap();
    let wrapper = schema
        .build("Wrapper")
        .unwrap()
        .set("addr", address.clone())
        .set("items", Value::List(vec![address.clone()]))
        .into_value();

    let mapper = Mapper::new(schema);
    let deep = mapper.map(&wrapper, &Ty::named("Wrapper")).unwrap();
    assert!(!deep.field("addr").unwrap().as_object().unwrap().ptr_eq(address.as_object().unwrap()));

    let shallow = mapper.with_config(MapConfig::builder().shallow(Ty::named("Address")).build());
    let copy = shallow.map(&wrapper, &Ty::named("Wrapper")).unwrap();
    assert!(copy.field("addr").unwrap().as_object().unwrap().ptr_eq(address.as_object().unwrap()));
    let items = copy.field("items").unwrap();
    assert!(items.as_list().unwrap()[0].as_object().unwrap().ptr_eq(address.as_object().unwrap()));
}
