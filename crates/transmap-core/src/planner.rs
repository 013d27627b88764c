//! Planning: derive the mapping operations for a type pair.
//!
//! The planner walks the destination type's members in declaration order and
//! decides, for each, where its value comes from and how it is carried over.
//!
//! Plans built for compilation bind every nested object member to the
//! transformer cache, so each pair is planned once no matter how often it
//! appears in a type graph. Expanded plans, used for inspection, inline the
//! nested pairs and stop at pairs already on the planning stack.

use crate::config::{GetterFn, MapConfig, MemberRule};
use crate::operation::{
    Block, CopyComplex, CopySimple, Filters, MappingOperation, NestedOps, ReadOnly, WriteOnly,
};
use crate::path::{Access, Accessor, MemberPath};
use crate::schema::Schema;
use crate::types::{ObjectDesc, Ty, TypeName};
use tracing::trace;

/// Errors that make a transformer impossible to build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("`{0}` is not an object type")]
    NotAnObject(Ty),

    #[error("empty member path")]
    EmptyPath,

    #[error("type `{ty}` has no member `{member}`")]
    UnknownMember { ty: TypeName, member: String },

    #[error("member `{ty}.{member}` is not readable")]
    Unreadable { ty: TypeName, member: String },

    #[error("member `{ty}.{member}` is not writable")]
    Unwritable { ty: TypeName, member: String },

    #[error("cannot traverse `{segment}` in `{path}`: not an object")]
    NotTraversable { path: String, segment: String },

    #[error("no way to construct `{ty}`{}", for_member(.member))]
    NoConstructor { member: Option<String>, ty: Ty },

    #[error("cannot map `{from}` to `{to}`{}", for_member(.member))]
    Unmappable {
        from: Ty,
        to: Ty,
        member: Option<String>,
    },

    #[error("`{from}` -> `{to}` was requested while being compiled on the same thread")]
    Reentrant { from: Ty, to: Ty },
}

fn for_member(member: &Option<String>) -> String {
    member
        .as_ref()
        .map(|m| format!(" (member `{}`)", m))
        .unwrap_or_default()
}

/// Planner for object-to-object mappings.
pub struct OperationPlanner<'a> {
    schema: &'a Schema,
    config: &'a MapConfig,
    expand: bool,
}

impl<'a> OperationPlanner<'a> {
    pub fn new(schema: &'a Schema, config: &'a MapConfig) -> Self {
        Self {
            schema,
            config,
            expand: true,
        }
    }

    /// Leave nested object members as [`NestedOps::Deferred`] instead of
    /// planning them inline.
    pub fn deferring(mut self) -> Self {
        self.expand = false;
        self
    }

    /// Plan the operations mapping `source` onto `destination`.
    ///
    /// Both types must be object types once `Option` is stripped.
    pub fn plan(&self, source: &Ty, destination: &Ty) -> Result<Vec<MappingOperation>, PlanError> {
        let source = self.object_name(source)?;
        let destination = self.object_name(destination)?;
        let mut stack = Vec::new();
        self.plan_pair(&source, &destination, &mut stack)
    }

    /// Whether a value of `source` can be mapped to `destination` at all.
    ///
    /// Object pairs are always considered convertible here; problems inside
    /// them surface when the pair itself is planned.
    pub fn is_convertible(&self, source: &Ty, destination: &Ty) -> bool {
        if source == destination || *source == Ty::Any || *destination == Ty::Any {
            return true;
        }
        if source.is_optional() || destination.is_optional() {
            return self.is_convertible(source.strip_optional(), destination.strip_optional());
        }
        match (source.element(), destination.element()) {
            (Some(s), Some(d)) => return self.is_convertible(s, d),
            (None, Some(d)) => return self.is_convertible(source, d),
            (Some(_), None) => return false,
            (None, None) => {}
        }
        if self.schema.is_object(source) && self.schema.is_object(destination) {
            return true;
        }
        self.config
            .converters()
            .resolve(source, destination, self.schema)
            .is_some()
    }

    fn object_name(&self, ty: &Ty) -> Result<TypeName, PlanError> {
        match ty.strip_optional() {
            Ty::Named(name) => match self.schema.get(name.as_str()) {
                Some(desc) if desc.as_object().is_some() => Ok(name.clone()),
                Some(_) => Err(PlanError::NotAnObject(ty.clone())),
                None => Err(PlanError::UnknownType(name.to_string())),
            },
            _ => Err(PlanError::NotAnObject(ty.clone())),
        }
    }

    fn object(&self, name: &TypeName) -> Result<&'a ObjectDesc, PlanError> {
        let schema: &'a Schema = self.schema;
        schema
            .get(name.as_str())
            .ok_or_else(|| PlanError::UnknownType(name.to_string()))?
            .as_object()
            .ok_or_else(|| PlanError::NotAnObject(Ty::Named(name.clone())))
    }

    fn plan_pair(
        &self,
        source: &TypeName,
        destination: &TypeName,
        stack: &mut Vec<(TypeName, TypeName)>,
    ) -> Result<Vec<MappingOperation>, PlanError> {
        stack.push((source.clone(), destination.clone()));
        let planned = self.plan_members(source, destination, stack);
        stack.pop();
        let ops = planned?;

        match self.config.pair_rule(source, destination) {
            Some(rule) if rule.has_filters() => Ok(vec![MappingOperation::Block(Block {
                ops,
                filters: Filters {
                    source: rule.source_filter,
                    destination: rule.destination_filter,
                },
            })]),
            _ => Ok(ops),
        }
    }

    fn plan_members(
        &self,
        source: &TypeName,
        destination: &TypeName,
        stack: &mut Vec<(TypeName, TypeName)>,
    ) -> Result<Vec<MappingOperation>, PlanError> {
        let source_obj = self.object(source)?;
        let destination_obj = self.object(destination)?;
        let mut ops = Vec::new();

        for (index, member) in destination_obj.members.iter().enumerate() {
            if !member.writable {
                continue;
            }
            if self.config.is_ignored(source, destination, &member.name) {
                trace!(%source, %destination, member = %member.name, "ignored");
                continue;
            }

            let rule = self
                .config
                .member_rule(source, destination, &member.name)
                .unwrap_or_default();
            let destination_path = MemberPath::single(Accessor {
                owner: destination.clone(),
                name: member.name.clone(),
                index,
                ty: member.ty.clone(),
            });

            if let Some(getter) = rule.getter.clone() {
                ops.push(write_only(getter, destination_path, &rule));
                continue;
            }

            let (source_path, explicit) = match &rule.map_from {
                Some(path) => (MemberPath::resolve(self.schema, source, path, Access::Read)?, true),
                None => match source_obj.member(&member.name) {
                    Some((i, m)) if m.readable => (
                        MemberPath::single(Accessor {
                            owner: source.clone(),
                            name: m.name.clone(),
                            index: i,
                            ty: m.ty.clone(),
                        }),
                        false,
                    ),
                    _ => {
                        trace!(%source, %destination, member = %member.name, "no source member");
                        continue;
                    }
                },
            };

            if let Some(op) = self.member_op(source_path, destination_path, rule, explicit, stack)? {
                ops.push(op);
            }
        }

        for (path, rule) in self.config.path_rules(source, destination) {
            let destination_path = MemberPath::resolve(self.schema, destination, &path, Access::Write)?;
            if let Some(getter) = rule.getter.clone() {
                ops.push(write_only(getter, destination_path, &rule));
                continue;
            }
            let from = rule.map_from.clone().unwrap_or_else(|| path.clone());
            let source_path = MemberPath::resolve(self.schema, source, &from, Access::Read)?;
            if let Some(op) = self.member_op(source_path, destination_path, rule, true, stack)? {
                ops.push(op);
            }
        }

        for read_only in self.config.read_only_rules(source, destination) {
            let source_path =
                MemberPath::resolve(self.schema, source, &read_only.source_path, Access::Read)?;
            ops.push(MappingOperation::ReadOnly(ReadOnly {
                source: source_path,
                setter: read_only.setter.clone(),
                filters: Filters::default(),
            }));
        }

        Ok(ops)
    }

    /// Operation for one source/destination member pair. `None` when a
    /// structurally matched member cannot be converted.
    fn member_op(
        &self,
        source: MemberPath,
        destination: MemberPath,
        rule: MemberRule,
        explicit: bool,
        stack: &mut Vec<(TypeName, TypeName)>,
    ) -> Result<Option<MappingOperation>, PlanError> {
        let source_ty = source.ty().clone();
        let destination_ty = destination.ty().clone();
        let filters = Filters {
            source: rule.source_filter.clone(),
            destination: rule.destination_filter.clone(),
        };
        let shallow = self.config.is_shallow(&destination_ty);

        let simple = |source: MemberPath, destination: MemberPath, shallow: bool| {
            MappingOperation::CopySimple(CopySimple {
                source,
                destination,
                converter: rule.converter.clone(),
                null_substitute: rule.null_substitute.clone(),
                post_processor: rule.post_processor.clone(),
                shallow,
                filters: filters.clone(),
            })
        };

        if rule.converter.is_some() {
            return Ok(Some(simple(source, destination, shallow)));
        }

        let object_pair = match (source_ty.strip_optional(), destination_ty.strip_optional()) {
            (Ty::Named(s), Ty::Named(d))
                if self.schema.object(s.as_str()).is_some()
                    && self.schema.object(d.as_str()).is_some() =>
            {
                Some((s.clone(), d.clone()))
            }
            _ => None,
        };
        if let Some((s, d)) = object_pair {
            let user_pair = self
                .config
                .converters()
                .get_pair(&Ty::Named(s.clone()), &Ty::Named(d.clone()))
                .is_some();
            if (shallow && s == d) || user_pair {
                return Ok(Some(simple(source, destination, shallow)));
            }

            let nested = if !self.expand {
                NestedOps::Deferred
            } else if stack.iter().any(|(a, b)| *a == s && *b == d) {
                trace!(source = %s, destination = %d, "deferred");
                NestedOps::Deferred
            } else {
                NestedOps::Planned(self.plan_pair(&s, &d, stack)?)
            };
            return Ok(Some(MappingOperation::CopyComplex(CopyComplex {
                source,
                destination,
                nested,
                target_constructor: rule.target_constructor.clone(),
                converter: None,
                post_processor: rule.post_processor.clone(),
                null_substitute: rule.null_substitute.clone(),
                filters,
            })));
        }

        if self.is_convertible(&source_ty, &destination_ty) {
            return Ok(Some(simple(source, destination, shallow)));
        }
        if explicit {
            return Err(PlanError::Unmappable {
                from: source_ty,
                to: destination_ty,
                member: Some(destination.to_string()),
            });
        }
        trace!(from = %source_ty, to = %destination_ty, member = %destination, "not convertible");
        Ok(None)
    }
}

fn write_only(getter: GetterFn, destination: MemberPath, rule: &MemberRule) -> MappingOperation {
    MappingOperation::WriteOnly(WriteOnly {
        getter,
        destination,
        filters: Filters {
            source: rule.source_filter.clone(),
            destination: rule.destination_filter.clone(),
        },
    })
}
