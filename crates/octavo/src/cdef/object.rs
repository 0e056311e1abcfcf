//! classdef instances.
//!
//! A [`CdefObject`] is a nullable refcounted handle over one of three
//! representations: a scalar (property map plus construction ledger), an
//! array of objects, or a reflection entity. The default-constructed object
//! has no representation at all; every operation on it fails with an
//! invalid-object error naming the attempted operation. That null state is
//! what a deleted handle degrades to.
//!
//! Handle/value semantics live in [`CdefObject::clone_object`]: handle
//! objects alias on clone, value objects deep-copy their property map
//! (nested objects copied by their own semantics, recursively — cycles in
//! value-object graphs are a user error this layer does not detect).

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::cdef::class::CdefClass;
use crate::cdef::meta::{self, MetaEntity};
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::value::Value;

/// Per-(object, class) construction state. Absence from the ledger means
/// "not marked": construction has not started for that class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtorState {
    PendingConstruction,
    Constructed,
}

/// One evaluated index operation, arguments already reduced to values.
#[derive(Debug, Clone)]
pub enum ResolvedIndex {
    Paren(Vec<Value>),
    Brace(Vec<Value>),
    Dot(String),
}

impl ResolvedIndex {
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Paren(_) => "()",
            Self::Brace(_) => "{}",
            Self::Dot(_) => ".",
        }
    }

    /// The `{type, subs}` cell handed to user-defined `subsref`/`subsasgn`
    /// overloads.
    #[must_use]
    pub fn to_substruct(&self) -> Value {
        let (tag, subs) = match self {
            Self::Paren(args) => ("()", Value::Cell(Rc::new(args.clone()))),
            Self::Brace(args) => ("{}", Value::Cell(Rc::new(args.clone()))),
            Self::Dot(name) => (".", Value::Str(name.clone())),
        };
        Value::Cell(Rc::new(vec![Value::Str(tag.to_owned()), subs]))
    }
}

struct ScalarRep {
    class: CdefClass,
    handle: bool,
    properties: IndexMap<String, Value>,
    /// Construction ledger, one entry per class in the ancestry once marked.
    ledger: IndexMap<String, CtorState>,
    /// Set by an explicit `delete`; every alias observes it.
    deleted: bool,
}

struct ArrayRep {
    class: CdefClass,
    elems: Vec<CdefObject>,
}

enum ObjectRep {
    Scalar(ScalarRep),
    Array(ArrayRep),
    Meta(MetaEntity),
}

/// A nullable, refcounted handle to an object representation.
#[derive(Clone, Default)]
pub struct CdefObject {
    rep: Option<Rc<RefCell<ObjectRep>>>,
}

impl fmt::Debug for CdefObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_tag())
    }
}

impl CdefObject {
    #[must_use]
    pub fn new_scalar(class: CdefClass, handle: bool) -> Self {
        Self {
            rep: Some(Rc::new(RefCell::new(ObjectRep::Scalar(ScalarRep {
                class,
                handle,
                properties: IndexMap::new(),
                ledger: IndexMap::new(),
                deleted: false,
            })))),
        }
    }

    #[must_use]
    pub fn new_array(class: CdefClass, elems: Vec<Self>) -> Self {
        Self {
            rep: Some(Rc::new(RefCell::new(ObjectRep::Array(ArrayRep {
                class,
                elems,
            })))),
        }
    }

    #[must_use]
    pub fn new_meta(entity: MetaEntity) -> Self {
        Self {
            rep: Some(Rc::new(RefCell::new(ObjectRep::Meta(entity)))),
        }
    }

    /// True for any object that has a live representation: neither the null
    /// placeholder nor an explicitly deleted handle.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match &self.rep {
            None => false,
            Some(rep) => match &*rep.borrow() {
                ObjectRep::Scalar(s) => !s.deleted,
                ObjectRep::Array(_) | ObjectRep::Meta(_) => true,
            },
        }
    }

    /// The universal guard: resolves the representation or fails with an
    /// invalid-object error naming the attempted operation.
    fn rep(&self, operation: &str) -> ExecResult<Rc<RefCell<ObjectRep>>> {
        match &self.rep {
            Some(rep) if self.is_valid() => Ok(Rc::clone(rep)),
            _ => Err(ExecError::new(
                ErrorId::InvalidObject,
                format!("{operation}: invalid object"),
            )),
        }
    }

    /// Identity: two handles aliasing one representation (two null handles
    /// are also the same).
    #[must_use]
    pub fn is_same(&self, other: &Self) -> bool {
        match (&self.rep, &other.rep) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// The owning class, if this is an ordinary (non-meta) object.
    #[must_use]
    pub fn class(&self) -> Option<CdefClass> {
        let rep = self.rep.as_ref()?;
        match &*rep.borrow() {
            ObjectRep::Scalar(s) => Some(s.class.clone()),
            ObjectRep::Array(a) => Some(a.class.clone()),
            ObjectRep::Meta(_) => None,
        }
    }

    /// The name `class(x)` reports.
    pub fn class_name(&self) -> ExecResult<String> {
        let rep = self.rep("class")?;
        let name = match &*rep.borrow() {
            ObjectRep::Scalar(s) => s.class.name(),
            ObjectRep::Array(a) => a.class.name(),
            ObjectRep::Meta(entity) => entity.class_name().to_owned(),
        };
        Ok(name)
    }

    #[must_use]
    pub fn is_handle(&self) -> bool {
        match &self.rep {
            None => false,
            Some(rep) => match &*rep.borrow() {
                ObjectRep::Scalar(s) => s.handle,
                ObjectRep::Array(a) => a.class.is_handle(),
                // reflection entities always behave as handles
                ObjectRep::Meta(_) => true,
            },
        }
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        match &self.rep {
            None => 0,
            Some(rep) => match &*rep.borrow() {
                ObjectRep::Array(a) => a.elems.len(),
                ObjectRep::Scalar(_) | ObjectRep::Meta(_) => 1,
            },
        }
    }

    /// MATLAB assignment semantics: handle objects alias, value objects
    /// deep-copy.
    #[must_use]
    pub fn clone_object(&self) -> Self {
        if self.is_handle() {
            return self.clone();
        }
        self.duplicate()
    }

    /// A true duplication regardless of handle semantics — explicit
    /// user-level copy construction, distinct from aliasing.
    #[must_use]
    pub fn copy_object(&self) -> Self {
        self.duplicate()
    }

    fn duplicate(&self) -> Self {
        let Some(rep) = &self.rep else {
            return Self::default();
        };
        let copied = match &*rep.borrow() {
            ObjectRep::Scalar(s) => ObjectRep::Scalar(ScalarRep {
                class: s.class.clone(),
                handle: s.handle,
                properties: s
                    .properties
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone_for_assign()))
                    .collect(),
                ledger: s.ledger.clone(),
                deleted: s.deleted,
            }),
            ObjectRep::Array(a) => ObjectRep::Array(ArrayRep {
                class: a.class.clone(),
                elems: a.elems.iter().map(Self::clone_object).collect(),
            }),
            ObjectRep::Meta(entity) => ObjectRep::Meta(entity.clone()),
        };
        Self {
            rep: Some(Rc::new(RefCell::new(copied))),
        }
    }

    /// Marks the scalar representation deleted; all aliases become invalid.
    pub fn invalidate(&self) -> ExecResult<()> {
        let rep = self.rep("delete")?;
        if let ObjectRep::Scalar(s) = &mut *rep.borrow_mut() {
            s.deleted = true;
        }
        Ok(())
    }

    // --- raw property slots -------------------------------------------------

    /// Reads a property slot directly, bypassing access checks and dependent
    /// dispatch. Construction and reflection use this.
    pub fn get(&self, name: &str) -> ExecResult<Value> {
        let rep = self.rep("property read")?;
        let borrowed = rep.borrow();
        match &*borrowed {
            ObjectRep::Scalar(s) => s.properties.get(name).cloned().ok_or_else(|| {
                ExecError::new(
                    ErrorId::UndefinedMember,
                    format!("object of class '{}' has no property '{name}'", s.class.name()),
                )
            }),
            _ => Err(ExecError::new(
                ErrorId::WrongType,
                format!("property read: '{name}' requires a scalar object"),
            )),
        }
    }

    /// Writes a property slot directly.
    pub fn put(&self, name: &str, value: Value) -> ExecResult<()> {
        let rep = self.rep("property write")?;
        let mut borrowed = rep.borrow_mut();
        match &mut *borrowed {
            ObjectRep::Scalar(s) => {
                s.properties.insert(name.to_owned(), value);
                Ok(())
            }
            _ => Err(ExecError::new(
                ErrorId::WrongType,
                format!("property write: '{name}' requires a scalar object"),
            )),
        }
    }

    // --- construction ledger ------------------------------------------------

    /// Seeds the ledger with a pending entry for `class` and its whole
    /// ancestry. Idempotent; never downgrades a constructed entry.
    pub fn mark_for_construction(&self, class: &CdefClass) -> ExecResult<()> {
        let rep = self.rep("mark for construction")?;
        if let ObjectRep::Scalar(s) = &mut *rep.borrow_mut() {
            for ancestor in class.ancestry() {
                s.ledger
                    .entry(ancestor.name())
                    .or_insert(CtorState::PendingConstruction);
            }
        }
        Ok(())
    }

    /// Settles the ledger entry for one class: its constructor has run.
    pub fn mark_as_constructed_for(&self, class_name: &str) -> ExecResult<()> {
        let rep = self.rep("mark as constructed")?;
        if let ObjectRep::Scalar(s) = &mut *rep.borrow_mut() {
            s.ledger
                .insert(class_name.to_owned(), CtorState::Constructed);
        }
        Ok(())
    }

    /// Terminal state: the outermost constructor completed, the whole ledger
    /// settles.
    pub fn mark_fully_constructed(&self) -> ExecResult<()> {
        let rep = self.rep("mark as constructed")?;
        if let ObjectRep::Scalar(s) = &mut *rep.borrow_mut() {
            for state in s.ledger.values_mut() {
                *state = CtorState::Constructed;
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn is_constructed_for(&self, class_name: &str) -> bool {
        self.ledger_state(class_name) == Some(CtorState::Constructed)
    }

    #[must_use]
    pub fn is_partially_constructed_for(&self, class_name: &str) -> bool {
        self.ledger_state(class_name) == Some(CtorState::PendingConstruction)
    }

    fn ledger_state(&self, class_name: &str) -> Option<CtorState> {
        let rep = self.rep.as_ref()?;
        match &*rep.borrow() {
            ObjectRep::Scalar(s) => s.ledger.get(class_name).copied(),
            _ => None,
        }
    }

    /// Short display form, e.g. `<Point>` or `<invalid object>`.
    #[must_use]
    pub fn display_tag(&self) -> String {
        if !self.is_valid() {
            return "<invalid object>".to_owned();
        }
        match &*self.rep.as_ref().unwrap_or_else(|| unreachable!()).borrow() {
            ObjectRep::Scalar(s) => format!("<{}>", s.class.name()),
            ObjectRep::Array(a) => format!("<1x{} {} array>", a.elems.len(), a.class.name()),
            ObjectRep::Meta(entity) => format!("<{} {}>", entity.class_name(), entity.short_name()),
        }
    }

    // --- indexing dispatch --------------------------------------------------

    /// Applies one index operation to this object. A class-defined `subsref`
    /// method overrides the builtin behavior for ordinary objects.
    pub fn subsref(
        &self,
        ev: &mut TreeEvaluator,
        op: &ResolvedIndex,
        nargout: usize,
    ) -> ExecResult<Vec<Value>> {
        let rep = self.rep(op.tag())?;

        let meta_entity = match &*rep.borrow() {
            ObjectRep::Meta(entity) => Some(entity.clone()),
            _ => None,
        };
        if let Some(entity) = meta_entity {
            return meta::meta_entity_subsref(&entity, ev, op);
        }

        if let Some(class) = self.class() {
            if let Some(overload) = class.find_method("subsref", false) {
                return ev.call_cdef_method_on(&overload, self, &[op.to_substruct()], nargout);
            }
        }

        match op {
            ResolvedIndex::Dot(member) => self.dot_read(ev, member),
            ResolvedIndex::Paren(indices) => {
                let selected = self.paren_select(indices)?;
                Ok(vec![Value::Object(selected)])
            }
            ResolvedIndex::Brace(_) => Err(ExecError::new(
                ErrorId::BadOperation,
                format!(
                    "'{{}}' indexing is undefined for objects of class '{}'",
                    self.class_name()?
                ),
            )),
        }
    }

    fn dot_read(&self, ev: &mut TreeEvaluator, member: &str) -> ExecResult<Vec<Value>> {
        let class = self.class().ok_or_else(|| {
            ExecError::new(ErrorId::WrongType, "'.' indexing requires a scalar object")
        })?;
        if self.numel() != 1 {
            return Err(ExecError::new(
                ErrorId::WrongType,
                "'.' indexing requires a scalar object",
            ));
        }
        if let Some(prop) = class.find_property(member) {
            if !CdefClass::member_accessible(&prop.owner, prop.get_access, ev) {
                return Err(ExecError::new(
                    ErrorId::PrivateAccess,
                    format!("property '{member}' of class '{}' is not accessible", class.name()),
                ));
            }
            self.check_construction_state(ev, &prop.owner, member)?;
            if prop.constant {
                return Ok(vec![class.constant_value(ev, &prop)?]);
            }
            if prop.dependent {
                let getter = class.find_method(&format!("get.{member}"), false).ok_or_else(|| {
                    ExecError::new(
                        ErrorId::BadOperation,
                        format!(
                            "dependent property '{member}' of class '{}' has no get method",
                            class.name()
                        ),
                    )
                })?;
                return ev.call_cdef_method_on(&getter, self, &[], 1);
            }
            return Ok(vec![self.get(member)?]);
        }
        if let Some(method) = class.find_method(member, false) {
            if !CdefClass::member_accessible(&method.owner, method.access, ev) {
                return Err(ExecError::new(
                    ErrorId::PrivateAccess,
                    format!("method '{member}' of class '{}' is not accessible", class.name()),
                ));
            }
            // bare `obj.method` is a zero-argument call
            return ev.call_cdef_method_on(&method, self, &[], 1);
        }
        Err(ExecError::new(
            ErrorId::UndefinedMember,
            format!("class '{}' has no member '{member}'", class.name()),
        ))
    }

    fn paren_select(&self, indices: &[Value]) -> ExecResult<Self> {
        let rep = self.rep("()")?;
        let borrowed = rep.borrow();
        match &*borrowed {
            ObjectRep::Array(a) => match indices {
                [] => Ok(self.clone()),
                [Value::Str(colon)] if colon == ":" => Ok(self.clone()),
                [index] => {
                    let i = linear_index(index, a.elems.len())?;
                    Ok(a.elems[i - 1].clone())
                }
                _ => Err(ExecError::new(
                    ErrorId::BadIndex,
                    "object arrays support a single linear index",
                )),
            },
            ObjectRep::Scalar(_) => match indices {
                [] => Ok(self.clone()),
                [Value::Str(colon)] if colon == ":" => Ok(self.clone()),
                [index] if linear_index(index, 1).is_ok() => Ok(self.clone()),
                _ => Err(ExecError::new(
                    ErrorId::BadIndex,
                    "index out of bound for scalar object",
                )),
            },
            ObjectRep::Meta(_) => unreachable!("meta objects dispatch through meta_entity_subsref"),
        }
    }

    /// Applies an index-assignment chain, returning the object to rebind
    /// (value objects copy first; handle objects mutate in place and return
    /// an alias). `auto_add` enables array growth on out-of-bound paren
    /// assignment.
    pub fn subsasgn(
        &self,
        ev: &mut TreeEvaluator,
        ops: &[ResolvedIndex],
        rhs: Value,
        auto_add: bool,
    ) -> ExecResult<Self> {
        let first = ops.first().ok_or_else(|| {
            ExecError::new(ErrorId::BadOperation, "subsasgn: empty index chain")
        })?;
        self.rep(first.tag())?;

        if let Some(class) = self.class() {
            if let Some(overload) = class.find_method("subsasgn", false) {
                let chain: Vec<Value> =
                    ops.iter().map(ResolvedIndex::to_substruct).collect();
                let args = vec![Value::Cell(Rc::new(chain)), rhs];
                let mut result = ev.call_cdef_method_on(&overload, self, &args, 1)?;
                return match result.pop() {
                    Some(Value::Object(obj)) => Ok(obj),
                    _ => Err(ExecError::new(
                        ErrorId::WrongType,
                        format!("subsasgn of class '{}' must return an object", class.name()),
                    )),
                };
            }
        }

        // value semantics: the mutation happens on a copy that the caller
        // rebinds; handle semantics mutate the shared representation
        let target = self.clone_object();
        target.apply_assign(ev, ops, rhs, auto_add)?;
        Ok(target)
    }

    fn apply_assign(
        &self,
        ev: &mut TreeEvaluator,
        ops: &[ResolvedIndex],
        rhs: Value,
        auto_add: bool,
    ) -> ExecResult<()> {
        match ops {
            [ResolvedIndex::Dot(member)] => self.dot_write(ev, member, rhs),
            [ResolvedIndex::Dot(member), rest @ ..] => {
                let current = self.subsref(ev, &ResolvedIndex::Dot(member.clone()), 1)?;
                let current = current.into_iter().next().unwrap_or_default();
                let updated = ev.assign_into_value(current, rest, rhs)?;
                self.dot_write(ev, member, updated)
            }
            [ResolvedIndex::Paren(indices)] => self.paren_write(ev, indices, rhs, auto_add),
            _ => Err(ExecError::new(
                ErrorId::BadOperation,
                format!("unsupported '{}' assignment on object", ops[0].tag()),
            )),
        }
    }

    fn dot_write(&self, ev: &mut TreeEvaluator, member: &str, rhs: Value) -> ExecResult<()> {
        let class = self.class().ok_or_else(|| {
            ExecError::new(ErrorId::WrongType, "'.' assignment requires a scalar object")
        })?;
        let Some(prop) = class.find_property(member) else {
            return Err(ExecError::new(
                ErrorId::UndefinedMember,
                format!("class '{}' has no property '{member}'", class.name()),
            ));
        };
        if prop.constant {
            return Err(ExecError::new(
                ErrorId::ConstantAccess,
                format!("property '{member}' of class '{}' is constant", class.name()),
            ));
        }
        if !CdefClass::member_accessible(&prop.owner, prop.set_access, ev) {
            return Err(ExecError::new(
                ErrorId::PrivateAccess,
                format!("property '{member}' of class '{}' is not settable here", class.name()),
            ));
        }
        self.check_construction_state(ev, &prop.owner, member)?;
        if prop.dependent {
            let setter = class.find_method(&format!("set.{member}"), false).ok_or_else(|| {
                ExecError::new(
                    ErrorId::BadOperation,
                    format!(
                        "dependent property '{member}' of class '{}' has no set method",
                        class.name()
                    ),
                )
            })?;
            ev.call_cdef_method_on(&setter, self, &[rhs], 0)?;
            return Ok(());
        }
        self.put(member, rhs.clone_for_assign())
    }

    fn paren_write(
        &self,
        _ev: &mut TreeEvaluator,
        indices: &[Value],
        rhs: Value,
        auto_add: bool,
    ) -> ExecResult<()> {
        let Value::Object(new_elem) = rhs else {
            return Err(ExecError::new(
                ErrorId::WrongType,
                "'()' assignment into an object requires an object value",
            ));
        };
        let [index] = indices else {
            return Err(ExecError::new(
                ErrorId::BadIndex,
                "object arrays support a single linear index",
            ));
        };
        let i = linear_index_unchecked(index)?;
        let rep = self.rep("()")?;
        let mut borrowed = rep.borrow_mut();
        match &mut *borrowed {
            ObjectRep::Array(a) => {
                if i > a.elems.len() {
                    if !auto_add {
                        return Err(ExecError::new(
                            ErrorId::BadIndex,
                            format!("index {i} out of bound {}", a.elems.len()),
                        ));
                    }
                    let filler = a.class.empty_instance();
                    a.elems.resize_with(i, || filler.clone());
                }
                a.elems[i - 1] = new_elem;
                Ok(())
            }
            ObjectRep::Scalar(s) => {
                if i == 1 {
                    // replace in place is not expressible on a shared rep;
                    // rebuild as a one-element array holding the new object
                    let class = s.class.clone();
                    *borrowed = ObjectRep::Array(ArrayRep {
                        class,
                        elems: vec![new_elem],
                    });
                    Ok(())
                } else if auto_add {
                    let class = s.class.clone();
                    let filler = class.empty_instance();
                    let first = Self {
                        rep: Some(Rc::new(RefCell::new(ObjectRep::Scalar(ScalarRep {
                            class: s.class.clone(),
                            handle: s.handle,
                            properties: s.properties.clone(),
                            ledger: s.ledger.clone(),
                            deleted: s.deleted,
                        })))),
                    };
                    let mut elems = vec![first];
                    elems.resize_with(i, || filler.clone());
                    elems[i - 1] = new_elem;
                    *borrowed = ObjectRep::Array(ArrayRep { class, elems });
                    Ok(())
                } else {
                    Err(ExecError::new(
                        ErrorId::BadIndex,
                        format!("index {i} out of bound 1"),
                    ))
                }
            }
            ObjectRep::Meta(_) => Err(ExecError::new(
                ErrorId::BadOperation,
                "cannot assign into a reflection object",
            )),
        }
    }

    /// Strict-construction check: reading or writing a property while its
    /// declaring class is still pending construction is rejected, unless the
    /// access comes from inside the construction chain itself.
    fn check_construction_state(
        &self,
        ev: &TreeEvaluator,
        owner: &str,
        property: &str,
    ) -> ExecResult<()> {
        if !ev.strict_construction() || !self.is_partially_constructed_for(owner) {
            return Ok(());
        }
        let inside_chain = ev
            .current_class_context()
            .is_some_and(|ctx| self.class().is_some_and(|class| class.is_a(&ctx.name())));
        if inside_chain {
            return Ok(());
        }
        Err(ExecError::new(
            ErrorId::PartialConstruction,
            format!("cannot access property '{property}': class '{owner}' is only partially constructed"),
        ))
    }
}

fn linear_index(value: &Value, len: usize) -> ExecResult<usize> {
    let i = linear_index_unchecked(value)?;
    if i > len {
        return Err(ExecError::new(
            ErrorId::BadIndex,
            format!("index {i} out of bound {len}"),
        ));
    }
    Ok(i)
}

fn linear_index_unchecked(value: &Value) -> ExecResult<usize> {
    let n = value.as_num()?;
    if n < 1.0 || n.fract() != 0.0 {
        return Err(ExecError::new(
            ErrorId::BadIndex,
            format!("'{n}' is not a valid index"),
        ));
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn value_class() -> CdefClass {
        CdefClass::new("Point", Vec::new())
    }

    fn handle_class() -> CdefClass {
        CdefClass::new("Sensor", vec![CdefClass::root_handle()])
    }

    #[test]
    fn default_object_is_invalid_and_names_the_operation() {
        let obj = CdefObject::default();
        assert!(!obj.is_valid());
        let err = obj.get("x").unwrap_err();
        assert!(err.is(crate::error::ErrorId::InvalidObject));
        assert!(err.message.contains("property read"));
    }

    #[test]
    fn handle_clone_aliases_value_clone_copies() {
        let handle_obj = CdefObject::new_scalar(handle_class(), true);
        handle_obj.mark_for_construction(&handle_obj.class().unwrap()).unwrap();
        handle_obj.put("x", Value::Int(1)).unwrap();
        let alias = handle_obj.clone_object();
        alias.put("x", Value::Int(2)).unwrap();
        assert_eq!(handle_obj.get("x").unwrap(), Value::Int(2));
        assert!(alias.is_same(&handle_obj));

        let value_obj = CdefObject::new_scalar(value_class(), false);
        value_obj.put("x", Value::Int(1)).unwrap();
        let copied = value_obj.clone_object();
        copied.put("x", Value::Int(2)).unwrap();
        assert_eq!(value_obj.get("x").unwrap(), Value::Int(1));
        assert!(!copied.is_same(&value_obj));
    }

    #[test]
    fn copy_duplicates_even_handles() {
        let obj = CdefObject::new_scalar(handle_class(), true);
        obj.put("x", Value::Int(1)).unwrap();
        let copied = obj.copy_object();
        copied.put("x", Value::Int(9)).unwrap();
        assert_eq!(obj.get("x").unwrap(), Value::Int(1));
        assert!(!copied.is_same(&obj));
    }

    #[test]
    fn ledger_walks_not_marked_pending_constructed() {
        let base = CdefClass::new("Base", Vec::new());
        let child = CdefClass::new("Child", vec![base]);
        let obj = CdefObject::new_scalar(child.clone(), false);

        assert!(!obj.is_constructed_for("Child"));
        assert!(!obj.is_partially_constructed_for("Child"));

        obj.mark_for_construction(&child).unwrap();
        assert!(obj.is_partially_constructed_for("Child"));
        assert!(obj.is_partially_constructed_for("Base"));

        obj.mark_as_constructed_for("Base").unwrap();
        assert!(obj.is_constructed_for("Base"));
        assert!(obj.is_partially_constructed_for("Child"));

        obj.mark_fully_constructed().unwrap();
        assert!(obj.is_constructed_for("Child"));
    }

    #[test]
    fn invalidate_reaches_all_aliases() {
        let obj = CdefObject::new_scalar(handle_class(), true);
        let alias = obj.clone_object();
        obj.invalidate().unwrap();
        assert!(!alias.is_valid());
        let err = alias.get("x").unwrap_err();
        assert!(err.is(crate::error::ErrorId::InvalidObject));
    }
}
