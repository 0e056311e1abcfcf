//! Reflection entities: `meta.class`, `meta.property`, `meta.method` and
//! `meta.package`.
//!
//! Wrapped in [`CdefObject`] (via [`ObjectRep`]'s meta variant) so they
//! participate in the ordinary indexing protocol; a `?Class` expression or a
//! `metaclass(obj)` call produces one. Reflection objects always carry
//! handle semantics.
//!
//! [`ObjectRep`]: super::object

use std::rc::Rc;

use crate::cdef::class::{CdefClass, MemberMode};
use crate::cdef::object::{CdefObject, ResolvedIndex};
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::value::Value;

/// What a meta object reflects.
#[derive(Debug, Clone)]
pub enum MetaEntity {
    Class(CdefClass),
    /// A property, as found on `owner` (the class the lookup went through).
    Property { owner: CdefClass, name: String },
    Method { owner: CdefClass, name: String },
    /// A dotted package prefix; its classes come from the registry.
    Package { name: String },
}

impl MetaEntity {
    /// The reported class of the wrapping object.
    #[must_use]
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Class(_) => "meta.class",
            Self::Property { .. } => "meta.property",
            Self::Method { .. } => "meta.method",
            Self::Package { .. } => "meta.package",
        }
    }

    /// The entity's own name, for display.
    #[must_use]
    pub fn short_name(&self) -> String {
        match self {
            Self::Class(class) => class.name(),
            Self::Property { name, .. } | Self::Method { name, .. } => name.clone(),
            Self::Package { name } => name.clone(),
        }
    }
}

/// Dot access on a reflection object.
pub(crate) fn meta_entity_subsref(
    entity: &MetaEntity,
    ev: &mut TreeEvaluator,
    op: &ResolvedIndex,
) -> ExecResult<Vec<Value>> {
    let ResolvedIndex::Dot(field) = op else {
        return Err(ExecError::new(
            ErrorId::BadOperation,
            format!("'{}' indexing is undefined for {}", op.tag(), entity.class_name()),
        ));
    };
    let value = match entity {
        MetaEntity::Class(class) => class_field(class, field)?,
        MetaEntity::Property { owner, name } => property_field(ev, owner, name, field)?,
        MetaEntity::Method { owner, name } => method_field(ev, owner, name, field)?,
        MetaEntity::Package { name } => package_field(ev, name, field)?,
    };
    Ok(vec![value])
}

fn class_field(class: &CdefClass, field: &str) -> ExecResult<Value> {
    let value = match field {
        "Name" => Value::Str(class.name()),
        "Abstract" => Value::Bool(class.is_abstract()),
        "Sealed" => Value::Bool(class.is_sealed()),
        "HandleCompatible" => Value::Bool(class.is_handle()),
        "SuperclassList" => Value::Cell(Rc::new(
            class
                .superclasses()
                .iter()
                .map(|sup| Value::Object(sup.meta_object()))
                .collect(),
        )),
        "PropertyList" => Value::Cell(Rc::new(
            class
                .get_properties(MemberMode::All)
                .into_iter()
                .map(|prop| {
                    Value::Object(CdefObject::new_meta(MetaEntity::Property {
                        owner: class.clone(),
                        name: prop.name,
                    }))
                })
                .collect(),
        )),
        "MethodList" => Value::Cell(Rc::new(
            class
                .get_methods(MemberMode::All)
                .into_iter()
                .map(|method| {
                    Value::Object(CdefObject::new_meta(MetaEntity::Method {
                        owner: class.clone(),
                        name: method.name,
                    }))
                })
                .collect(),
        )),
        _ => return Err(undefined_field("meta.class", field)),
    };
    Ok(value)
}

fn property_field(
    ev: &TreeEvaluator,
    owner: &CdefClass,
    name: &str,
    field: &str,
) -> ExecResult<Value> {
    let prop = owner.find_property(name).ok_or_else(|| {
        ExecError::new(
            ErrorId::UndefinedMember,
            format!("class '{}' has no property '{name}'", owner.name()),
        )
    })?;
    let value = match field {
        "Name" => Value::Str(prop.name),
        "GetAccess" => Value::Str(prop.get_access.as_str().to_owned()),
        "SetAccess" => Value::Str(prop.set_access.as_str().to_owned()),
        "Dependent" => Value::Bool(prop.dependent),
        "Constant" => Value::Bool(prop.constant),
        "DefiningClass" => defining_class(ev, &prop.owner)?,
        _ => return Err(undefined_field("meta.property", field)),
    };
    Ok(value)
}

fn method_field(
    ev: &TreeEvaluator,
    owner: &CdefClass,
    name: &str,
    field: &str,
) -> ExecResult<Value> {
    let method = owner.find_method(name, false).ok_or_else(|| {
        ExecError::new(
            ErrorId::UndefinedMember,
            format!("class '{}' has no method '{name}'", owner.name()),
        )
    })?;
    let value = match field {
        "Name" => Value::Str(method.name),
        "Static" => Value::Bool(method.is_static),
        "Abstract" => Value::Bool(method.is_abstract),
        "Access" => Value::Str(method.access.as_str().to_owned()),
        "DefiningClass" => defining_class(ev, &method.owner)?,
        _ => return Err(undefined_field("meta.method", field)),
    };
    Ok(value)
}

fn package_field(ev: &TreeEvaluator, name: &str, field: &str) -> ExecResult<Value> {
    let value = match field {
        "Name" => Value::Str(name.to_owned()),
        "ClassList" => Value::Cell(Rc::new(
            ev.classes()
                .classes_in_package(name)
                .iter()
                .map(|class| Value::Object(class.meta_object()))
                .collect(),
        )),
        _ => return Err(undefined_field("meta.package", field)),
    };
    Ok(value)
}

fn defining_class(ev: &TreeEvaluator, name: &str) -> ExecResult<Value> {
    let class = ev.classes().find_class(name).ok_or_else(|| {
        ExecError::new(
            ErrorId::UndefinedMember,
            format!("class '{name}' is not registered"),
        )
    })?;
    Ok(Value::Object(class.meta_object()))
}

fn undefined_field(kind: &str, field: &str) -> ExecError {
    ExecError::new(
        ErrorId::UndefinedMember,
        format!("{kind} objects have no field '{field}'"),
    )
}
