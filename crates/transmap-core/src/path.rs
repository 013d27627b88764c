//! Member paths: pre-resolved chains of member accessors.
//!
//! A path such as `address.city` is resolved once against the schema into
//! field indices. Reading and writing then never looks at member names.

use crate::planner::PlanError;
use crate::schema::Schema;
use crate::transformer::ExecutionError;
use crate::types::{Ty, TypeName};
use crate::value::{ObjectRef, Value};
use std::fmt;

/// How a path will be used. Decides which capability the segments need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// One resolved member of an object type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub owner: TypeName,
    pub name: String,
    pub index: usize,
    pub ty: Ty,
}

/// A non-empty chain of accessors rooted at an object type.
#[derive(Clone, PartialEq, Eq)]
pub struct MemberPath {
    segments: Vec<Accessor>,
}

impl MemberPath {
    /// Resolve a dotted path against `root`.
    ///
    /// Every segment but the last must be readable and hold an object type.
    /// The last must be readable for [`Access::Read`] and writable for
    /// [`Access::Write`].
    pub fn resolve(
        schema: &Schema,
        root: &TypeName,
        path: &str,
        access: Access,
    ) -> Result<Self, PlanError> {
        let names: Vec<&str> = path.split('.').map(str::trim).collect();
        if path.trim().is_empty() || names.iter().any(|n| n.is_empty()) {
            return Err(PlanError::EmptyPath);
        }

        let mut owner = root.clone();
        let mut segments = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let obj = schema
                .get(owner.as_str())
                .ok_or_else(|| PlanError::UnknownType(owner.to_string()))?
                .as_object()
                .ok_or_else(|| PlanError::NotAnObject(Ty::Named(owner.clone())))?;
            let (index, member) = obj.member(name).ok_or_else(|| PlanError::UnknownMember {
                ty: owner.clone(),
                member: name.to_string(),
            })?;

            let terminal = i + 1 == names.len();
            let needs_read = !terminal || access == Access::Read;
            if needs_read && !member.readable {
                return Err(PlanError::Unreadable {
                    ty: owner.clone(),
                    member: member.name.clone(),
                });
            }
            if terminal && access == Access::Write && !member.writable {
                return Err(PlanError::Unwritable {
                    ty: owner.clone(),
                    member: member.name.clone(),
                });
            }

            let accessor = Accessor {
                owner: owner.clone(),
                name: member.name.clone(),
                index,
                ty: member.ty.clone(),
            };
            if !terminal {
                owner = match member.ty.strip_optional() {
                    Ty::Named(next) if schema.object(next.as_str()).is_some() => next.clone(),
                    _ => {
                        return Err(PlanError::NotTraversable {
                            path: path.to_string(),
                            segment: member.name.clone(),
                        });
                    }
                };
            }
            segments.push(accessor);
        }
        Ok(Self { segments })
    }

    /// A path of one already-resolved accessor.
    pub fn single(accessor: Accessor) -> Self {
        Self {
            segments: vec![accessor],
        }
    }

    pub fn segments(&self) -> &[Accessor] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn terminal(&self) -> &Accessor {
        // Non-empty by construction.
        &self.segments[self.segments.len() - 1]
    }

    /// Type of the value this path reads or writes.
    pub fn ty(&self) -> &Ty {
        &self.terminal().ty
    }

    /// Read the value at the end of the path.
    ///
    /// A null root or null intermediate reads as `Null`.
    pub fn read(&self, root: &Value) -> Result<Value, ExecutionError> {
        let mut current = root.clone();
        for accessor in &self.segments {
            let obj = match &current {
                Value::Null => return Ok(Value::Null),
                Value::Object(obj) => obj.clone(),
                other => return Err(mismatch(&accessor.owner, other)),
            };
            current = field(&obj, accessor)?;
        }
        Ok(current)
    }

    /// Write `value` at the end of the path.
    ///
    /// Intermediate objects must exist; a null intermediate is an error.
    pub fn write(&self, root: &Value, value: Value) -> Result<(), ExecutionError> {
        let parent = self.parent(root)?;
        let terminal = self.terminal();
        check_owner(&parent, terminal)?;
        Ok(parent.set(terminal.index, value)?)
    }

    /// The object holding the terminal member.
    fn parent(&self, root: &Value) -> Result<ObjectRef, ExecutionError> {
        let mut current = match root {
            Value::Object(obj) => obj.clone(),
            Value::Null => {
                return Err(ExecutionError::DestinationRequired {
                    ty: Ty::Named(self.segments[0].owner.clone()),
                });
            }
            other => return Err(mismatch(&self.segments[0].owner, other)),
        };
        let intermediates = &self.segments[..self.segments.len() - 1];
        for (i, accessor) in intermediates.iter().enumerate() {
            current = match field(&current, accessor)? {
                Value::Object(next) => next,
                Value::Null => {
                    return Err(ExecutionError::NullIntermediate {
                        path: self.prefix(i + 1),
                    });
                }
                other => return Err(mismatch(&accessor.owner, &other)),
            };
        }
        Ok(current)
    }

    fn prefix(&self, len: usize) -> String {
        self.segments[..len]
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

fn check_owner(obj: &ObjectRef, accessor: &Accessor) -> Result<(), ExecutionError> {
    let found = obj.type_name();
    if found == accessor.owner {
        Ok(())
    } else {
        Err(ExecutionError::TypeMismatch {
            expected: accessor.owner.to_string(),
            found: found.to_string(),
        })
    }
}

fn field(obj: &ObjectRef, accessor: &Accessor) -> Result<Value, ExecutionError> {
    check_owner(obj, accessor)?;
    obj.get(accessor.index)
        .ok_or_else(|| ExecutionError::TypeMismatch {
            expected: format!("{}.{}", accessor.owner, accessor.name),
            found: obj.type_name().to_string(),
        })
}

fn mismatch(expected: &TypeName, found: &Value) -> ExecutionError {
    ExecutionError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind_name().to_string(),
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix(self.segments.len()))
    }
}

impl fmt::Debug for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberPath({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeDesc;
    use crate::value::FieldError;

    fn schema() -> Schema {
        Schema::new()
            .with(
                TypeDesc::object("Person")
                    .member("name", Ty::string())
                    .member("address", Ty::optional(Ty::named("Address")))
                    .read_only("age", Ty::i32()),
            )
            .unwrap()
            .with(
                TypeDesc::object("Address")
                    .member("city", Ty::string())
                    .write_only("secret", Ty::string()),
            )
            .unwrap()
    }

    fn person(schema: &Schema, address: Value) -> Value {
        schema
            .build("Person")
            .unwrap()
            .set("name", "Ada")
            .set("address", address)
            .into_value()
    }

    #[test]
    fn test_resolve_nested() {
        let schema = schema();
        let path = MemberPath::resolve(&schema, &"Person".into(), "address.city", Access::Read).unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path.ty(), &Ty::string());
        assert_eq!(path.terminal().owner.as_str(), "Address");
        assert_eq!(path.to_string(), "address.city");
    }

    #[test]
    fn test_resolve_errors() {
        let schema = schema();
        let root: TypeName = "Person".into();
        assert_eq!(
            MemberPath::resolve(&schema, &root, "", Access::Read),
            Err(PlanError::EmptyPath)
        );
        assert_eq!(
            MemberPath::resolve(&schema, &root, "address..city", Access::Read),
            Err(PlanError::EmptyPath)
        );
        assert!(matches!(
            MemberPath::resolve(&schema, &root, "nope", Access::Read),
            Err(PlanError::UnknownMember { .. })
        ));
        assert!(matches!(
            MemberPath::resolve(&schema, &root, "age", Access::Write),
            Err(PlanError::Unwritable { .. })
        ));
        assert!(matches!(
            MemberPath::resolve(&schema, &root, "address.secret", Access::Read),
            Err(PlanError::Unreadable { .. })
        ));
        assert!(MemberPath::resolve(&schema, &root, "address.secret", Access::Write).is_ok());
        assert!(matches!(
            MemberPath::resolve(&schema, &root, "name.len", Access::Read),
            Err(PlanError::NotTraversable { .. })
        ));
    }

    #[test]
    fn test_read_write() {
        let schema = schema();
        let address = schema.build("Address").unwrap().set("city", "Paris").into_value();
        let root = person(&schema, address);
        let path = MemberPath::resolve(&schema, &"Person".into(), "address.city", Access::Write).unwrap();

        assert_eq!(path.read(&root).unwrap(), Value::from("Paris"));
        path.write(&root, Value::from("Rome")).unwrap();
        assert_eq!(path.read(&root).unwrap(), Value::from("Rome"));
    }

    #[test]
    fn test_null_intermediate() {
        let schema = schema();
        let root = person(&schema, Value::Null);
        let path = MemberPath::resolve(&schema, &"Person".into(), "address.city", Access::Write).unwrap();

        assert_eq!(path.read(&root).unwrap(), Value::Null);
        let err = path.write(&root, Value::from("Rome")).unwrap_err();
        assert!(matches!(err, ExecutionError::NullIntermediate { ref path } if path == "address"));
        assert_eq!(path.read(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_wrong_root_type() {
        let schema = schema();
        let address = schema.build("Address").unwrap().into_value();
        let path = MemberPath::resolve(&schema, &"Person".into(), "name", Access::Read).unwrap();
        assert!(matches!(
            path.read(&address),
            Err(ExecutionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_write_reports_missing_field() {
        let schema = schema();
        let path = MemberPath::resolve(&schema, &"Person".into(), "address", Access::Write).unwrap();
        assert!(!path.is_empty());

        // Same type name, built from a schema with fewer members.
        let narrow = Schema::new()
            .with(TypeDesc::object("Person").member("name", Ty::string()))
            .unwrap();
        let root = narrow.build("Person").unwrap().into_value();
        let err = path.write(&root, Value::Null).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::Field(FieldError::OutOfRange { index: 1, .. })
        ));
    }
}
