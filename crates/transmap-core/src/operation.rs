//! Mapping operations: the plan for one type pair.
//!
//! Each operation targets one destination member. Operations carry the
//! member paths and callbacks they need; the compiler lowers them into an
//! executable program.

use crate::config::{ConvertFn, Factory, FilterFn, GetterFn, PostProcessFn, SetterFn, ValueProvider};
use crate::path::MemberPath;
use serde::Serialize;
use std::fmt;

/// Predicates deciding whether an operation runs.
#[derive(Clone, Default)]
pub struct Filters {
    /// Sees the source value of the operation.
    pub source: Option<FilterFn>,
    /// Sees the current destination value of the operation.
    pub destination: Option<FilterFn>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.destination.is_none()
    }
}

/// Copy of a value that needs no nested plan.
#[derive(Clone)]
pub struct CopySimple {
    pub source: MemberPath,
    pub destination: MemberPath,
    pub converter: Option<ConvertFn>,
    pub null_substitute: Option<ValueProvider>,
    pub post_processor: Option<PostProcessFn>,
    /// Copy by reference when the types are identical.
    pub shallow: bool,
    pub filters: Filters,
}

/// Nested operations of a complex member.
#[derive(Clone)]
pub enum NestedOps {
    Planned(Vec<MappingOperation>),
    /// Bound to the cached transformer for the member pair. Plans built for
    /// compilation always defer; expanded plans only where the pair is
    /// already being planned further up.
    Deferred,
}

/// Recursive mapping of an object-typed member.
#[derive(Clone)]
pub struct CopyComplex {
    pub source: MemberPath,
    pub destination: MemberPath,
    pub nested: NestedOps,
    pub target_constructor: Option<Factory>,
    pub converter: Option<ConvertFn>,
    pub post_processor: Option<PostProcessFn>,
    pub null_substitute: Option<ValueProvider>,
    pub filters: Filters,
}

/// A source value handed to a custom setter.
#[derive(Clone)]
pub struct ReadOnly {
    pub source: MemberPath,
    pub setter: SetterFn,
    pub filters: Filters,
}

/// A destination value produced by a custom getter.
#[derive(Clone)]
pub struct WriteOnly {
    pub getter: GetterFn,
    pub destination: MemberPath,
    pub filters: Filters,
}

/// A group of operations sharing filters.
#[derive(Clone)]
pub struct Block {
    pub ops: Vec<MappingOperation>,
    pub filters: Filters,
}

/// One unit of mapping work.
#[derive(Clone)]
pub enum MappingOperation {
    CopySimple(CopySimple),
    CopyComplex(CopyComplex),
    ReadOnly(ReadOnly),
    WriteOnly(WriteOnly),
    Block(Block),
}

/// Operation kind, for error reports and plan listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    CopySimple,
    CopyComplex,
    ReadOnly,
    WriteOnly,
    Block,
}

impl OpKind {
    pub fn name(self) -> &'static str {
        match self {
            OpKind::CopySimple => "copy_simple",
            OpKind::CopyComplex => "copy_complex",
            OpKind::ReadOnly => "read_only",
            OpKind::WriteOnly => "write_only",
            OpKind::Block => "block",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names an operation without holding on to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpDescriptor {
    pub kind: OpKind,
    #[serde(rename = "from")]
    pub read_path: Option<String>,
    #[serde(rename = "to")]
    pub write_path: Option<String>,
}

impl fmt::Display for OpDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        match (&self.read_path, &self.write_path) {
            (Some(from), Some(to)) => write!(f, " {} -> {}", from, to),
            (Some(from), None) => write!(f, " {} -> <setter>", from),
            (None, Some(to)) => write!(f, " <getter> -> {}", to),
            (None, None) => Ok(()),
        }
    }
}

impl MappingOperation {
    pub fn kind(&self) -> OpKind {
        match self {
            MappingOperation::CopySimple(_) => OpKind::CopySimple,
            MappingOperation::CopyComplex(_) => OpKind::CopyComplex,
            MappingOperation::ReadOnly(_) => OpKind::ReadOnly,
            MappingOperation::WriteOnly(_) => OpKind::WriteOnly,
            MappingOperation::Block(_) => OpKind::Block,
        }
    }

    pub fn filters(&self) -> &Filters {
        match self {
            MappingOperation::CopySimple(op) => &op.filters,
            MappingOperation::CopyComplex(op) => &op.filters,
            MappingOperation::ReadOnly(op) => &op.filters,
            MappingOperation::WriteOnly(op) => &op.filters,
            MappingOperation::Block(op) => &op.filters,
        }
    }

    /// Source path read by this operation, if any.
    pub fn source_path(&self) -> Option<&MemberPath> {
        match self {
            MappingOperation::CopySimple(op) => Some(&op.source),
            MappingOperation::CopyComplex(op) => Some(&op.source),
            MappingOperation::ReadOnly(op) => Some(&op.source),
            MappingOperation::WriteOnly(_) | MappingOperation::Block(_) => None,
        }
    }

    /// Destination path written by this operation, if any.
    pub fn destination_path(&self) -> Option<&MemberPath> {
        match self {
            MappingOperation::CopySimple(op) => Some(&op.destination),
            MappingOperation::CopyComplex(op) => Some(&op.destination),
            MappingOperation::WriteOnly(op) => Some(&op.destination),
            MappingOperation::ReadOnly(_) | MappingOperation::Block(_) => None,
        }
    }

    pub fn descriptor(&self) -> OpDescriptor {
        OpDescriptor {
            kind: self.kind(),
            read_path: self.source_path().map(ToString::to_string),
            write_path: self.destination_path().map(ToString::to_string),
        }
    }

    /// Directly nested operations.
    pub fn children(&self) -> &[MappingOperation] {
        match self {
            MappingOperation::CopyComplex(CopyComplex {
                nested: NestedOps::Planned(ops),
                ..
            }) => ops,
            MappingOperation::Block(block) => &block.ops,
            _ => &[],
        }
    }
}

impl fmt::Debug for MappingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.kind().name());
        if let Some(path) = self.source_path() {
            s.field("from", &path.to_string());
        }
        if let Some(path) = self.destination_path() {
            s.field("to", &path.to_string());
        }
        if let MappingOperation::CopyComplex(CopyComplex {
            nested: NestedOps::Deferred,
            ..
        }) = self
        {
            s.field("nested", &"deferred");
        }
        let children = self.children();
        if !children.is_empty() {
            s.field("ops", &children);
        }
        s.finish()
    }
}

/// Render a plan as an indented tree, one operation per line.
pub fn render_plan(ops: &[MappingOperation]) -> String {
    let mut out = String::new();
    render_into(ops, 0, &mut out);
    out
}

fn render_into(ops: &[MappingOperation], depth: usize, out: &mut String) {
    for op in ops {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&op.descriptor().to_string());
        let mut notes = Vec::new();
        match op {
            MappingOperation::CopySimple(copy) => {
                if copy.converter.is_some() {
                    notes.push("converter");
                }
                if copy.shallow {
                    notes.push("shallow");
                }
                if copy.null_substitute.is_some() {
                    notes.push("substitute");
                }
            }
            MappingOperation::CopyComplex(copy) => {
                if matches!(copy.nested, NestedOps::Deferred) {
                    notes.push("deferred");
                }
                if copy.target_constructor.is_some() {
                    notes.push("constructor");
                }
                if copy.null_substitute.is_some() {
                    notes.push("substitute");
                }
            }
            _ => {}
        }
        if !op.filters().is_empty() {
            notes.push("filtered");
        }
        if !notes.is_empty() {
            out.push_str(&format!(" [{}]", notes.join(", ")));
        }
        out.push('\n');
        render_into(op.children(), depth + 1, out);
    }
}
