//! The class builder: the sole component turning a parsed `classdef` block
//! into a registered-ready [`CdefClass`].

use std::rc::Rc;

use crate::ast::{Attr, ClassDef, ExprKind};
use crate::cdef::class::{Access, CdefClass, CdefMethod, CdefProperty};
use crate::cdef::manager::CdefManager;
use crate::error::{ErrorId, ExecError, ExecResult};

/// Builds a [`CdefClass`] from a class definition. Superclasses must already
/// be registered; the caller registers the result.
pub fn make_meta_class(manager: &CdefManager, def: &ClassDef) -> ExecResult<CdefClass> {
    let mut supers = Vec::with_capacity(def.superclass_list().len());
    for sup_name in def.superclass_list() {
        let sup = manager.find_class(sup_name).ok_or_else(|| {
            ExecError::new(
                ErrorId::BadClassDef,
                format!(
                    "superclass '{sup_name}' of class '{}' is undefined",
                    def.ident()
                ),
            )
        })?;
        if sup.is_sealed() {
            return Err(ExecError::new(
                ErrorId::BadClassDef,
                format!("cannot inherit from sealed class '{sup_name}'"),
            ));
        }
        supers.push(sup);
    }

    let class = CdefClass::new(def.ident(), supers);
    for attr in def.attribute_list() {
        match attr.name.as_str() {
            "Abstract" => class.set_abstract(attr_flag(attr)?),
            "Sealed" => class.set_sealed(attr_flag(attr)?),
            other => {
                return Err(ExecError::new(
                    ErrorId::BadClassDef,
                    format!("unknown class attribute '{other}'"),
                ));
            }
        }
    }

    for (block, decl) in def.properties_list() {
        let mut prop = CdefProperty {
            name: decl.name.clone(),
            owner: class.name(),
            default: decl.default.clone(),
            get_access: Access::Public,
            set_access: Access::Public,
            dependent: false,
            constant: false,
        };
        for attr in &block.attributes {
            match attr.name.as_str() {
                "Access" => {
                    let access = attr_access(attr)?;
                    prop.get_access = access;
                    prop.set_access = access;
                }
                "GetAccess" => prop.get_access = attr_access(attr)?,
                "SetAccess" => prop.set_access = attr_access(attr)?,
                "Dependent" => prop.dependent = attr_flag(attr)?,
                "Constant" => prop.constant = attr_flag(attr)?,
                other => {
                    return Err(ExecError::new(
                        ErrorId::BadClassDef,
                        format!("unknown property attribute '{other}'"),
                    ));
                }
            }
        }
        class.install_property(prop);
    }

    for (block, fdef) in def.methods_list() {
        let mut method = CdefMethod {
            name: fdef.name.clone(),
            owner: class.name(),
            function: Rc::new(fdef.clone()),
            is_static: false,
            is_abstract: false,
            access: Access::Public,
            is_constructor: fdef.name == def.ident(),
        };
        for attr in &block.attributes {
            match attr.name.as_str() {
                "Static" => method.is_static = attr_flag(attr)?,
                "Abstract" => method.is_abstract = attr_flag(attr)?,
                "Access" => method.access = attr_access(attr)?,
                other => {
                    return Err(ExecError::new(
                        ErrorId::BadClassDef,
                        format!("unknown method attribute '{other}'"),
                    ));
                }
            }
        }
        class.install_method(method);
    }

    Ok(class)
}

/// A flag attribute: bare name means true, otherwise a boolean literal.
fn attr_flag(attr: &Attr) -> ExecResult<bool> {
    match &attr.value {
        None => Ok(true),
        Some(expr) => match &expr.kind {
            ExprKind::Bool(flag) => Ok(*flag),
            _ => Err(ExecError::new(
                ErrorId::BadClassDef,
                format!("attribute '{}' expects a logical literal", attr.name),
            )),
        },
    }
}

/// An access attribute value: `public` / `protected` / `private`, written as
/// an identifier or a string.
fn attr_access(attr: &Attr) -> ExecResult<Access> {
    match &attr.value {
        Some(expr) => match &expr.kind {
            ExprKind::Ident(text) | ExprKind::Str(text) => Access::parse(text),
            _ => Err(ExecError::new(
                ErrorId::BadClassDef,
                format!("attribute '{}' expects an access specifier", attr.name),
            )),
        },
        None => Err(ExecError::new(
            ErrorId::BadClassDef,
            format!("attribute '{}' expects an access specifier", attr.name),
        )),
    }
}
