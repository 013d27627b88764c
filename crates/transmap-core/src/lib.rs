//! Transmap: compiled, cached mapping between object graphs.
//!
//! Types are described once in a [`Schema`]. For each source/destination
//! pair the [`OperationPlanner`] derives member-level operations, the
//! [`MappingCompiler`] lowers them into a [`Transformer`], and the
//! [`TransformerCache`] keeps one transformer per pair and configuration so
//! repeated mappings pay no planning cost.
//!
//! ```ignore
//! let mapper = Mapper::new(schema);
//! let dto = mapper.map(&customer, &Ty::named("CustomerDto"))?;
//! ```

mod cache;
mod collection;
mod compiler;
mod config;
mod converter;
mod format;
mod mapper;
mod operation;
mod path;
mod pattern;
mod planner;
mod profile;
mod registry;
mod schema;
mod transformer;
mod typed;
mod types;
mod value;

pub use cache::TransformerCache;
pub use compiler::MappingCompiler;
pub use config::{
    ConfigId, ConvertFn, Factory, FilterFn, GetterFn, MapConfig, MapConfigBuilder, MemberRule,
    NullCollections, PairRule, PostProcessFn, ReadOnlyRule, RuleScope, SetterFn, ValueProvider,
};
pub use converter::{ConvertError, Converter, ConverterDecl, FnConverter, MapState};
pub use format::Format;
pub use mapper::{Error, Mapper, Result};
pub use operation::{
    Block, CopyComplex, CopySimple, Filters, MappingOperation, NestedOps, OpDescriptor, OpKind,
    ReadOnly, WriteOnly, render_plan,
};
pub use path::{Access, Accessor, MemberPath};
pub use pattern::Predicate;
pub use planner::{OperationPlanner, PlanError};
pub use profile::{ConfigError, FilterSide, Profile, ProfileError, Rule};
pub use registry::ConverterRegistry;
pub use schema::{Schema, SchemaError};
pub use transformer::{ExecutionError, Transformer};
pub use typed::{Mappable, TypedMapper};
pub use types::{
    EnumDesc, MemberDesc, ObjectDesc, ScalarKind, Ty, TyParseError, TypeDesc, TypeKind, TypeName,
};
pub use value::{EnumValue, FieldError, ObjectBuilder, ObjectRef, Value, named_fields};
