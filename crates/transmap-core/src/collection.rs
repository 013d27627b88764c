//! Collection transformers.
//!
//! The destination is always a freshly built list; existing destination
//! collections are never mutated. A single non-list source value maps to a
//! one-element collection.

use crate::cache::TransformerRef;
use crate::compiler::MappingCompiler;
use crate::config::NullCollections;
use crate::converter::MapState;
use crate::planner::PlanError;
use crate::schema::Schema;
use crate::transformer::ExecutionError;
use crate::types::Ty;
use crate::value::Value;

enum Element {
    /// Elements are carried over as they are.
    Copy,
    Map(TransformerRef),
}

pub(crate) struct CollectionBody {
    element: Element,
    null_policy: NullCollections,
}

impl CollectionBody {
    pub(crate) fn compile(
        compiler: &MappingCompiler<'_>,
        source: &Ty,
        destination: &Ty,
    ) -> Result<Self, PlanError> {
        let unmappable = || PlanError::Unmappable {
            from: source.clone(),
            to: destination.clone(),
            member: None,
        };
        let to = destination.element().ok_or_else(unmappable)?;
        let from = source.element().unwrap_or(source);
        let config = compiler.config();

        let shallow = config.is_shallow(destination) || config.is_shallow(to);
        let element = if (shallow && (from == to || *to == Ty::Any))
            || (from == to && by_value(compiler.schema(), to))
        {
            Element::Copy
        } else {
            Element::Map(compiler.request(from, to)?)
        };
        Ok(Self {
            element,
            null_policy: config.null_collections(),
        })
    }

    pub(crate) fn handles_null(&self) -> bool {
        self.null_policy == NullCollections::Empty
    }

    pub(crate) fn run(&self, source: &Value, state: &MapState<'_>) -> Result<Value, ExecutionError> {
        let items = match source {
            Value::Null => {
                return Ok(match self.null_policy {
                    NullCollections::Propagate => Value::Null,
                    NullCollections::Empty => Value::List(Vec::new()),
                });
            }
            Value::List(items) => items.as_slice(),
            single => std::slice::from_ref(single),
        };

        let transformer = match &self.element {
            Element::Copy => return Ok(Value::List(items.to_vec())),
            Element::Map(element) => element.resolve()?,
        };

        let mut out = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if item.is_null() {
                out.push(Value::Null);
                continue;
            }
            let mapped = transformer
                .run(item, None, state)
                .map_err(|e| e.in_element(index))?;
            out.push(mapped);
        }
        Ok(Value::List(out))
    }
}

/// Types whose values hold no shared object references.
fn by_value(schema: &Schema, ty: &Ty) -> bool {
    match ty {
        Ty::Scalar(_) => true,
        Ty::Named(_) => schema.is_enum(ty),
        _ => false,
    }
}
