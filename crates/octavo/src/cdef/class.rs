//! Class metadata: member tables, inheritance resolution and the
//! construction protocol.
//!
//! A [`CdefClass`] is a cheap handle (`Rc<RefCell<_>>`) shared by the
//! registry, every live object of the class, and every subclass that lists
//! it as a superclass. Member resolution is depth-first through the declared
//! superclass order; the first match wins, so the leftmost superclass
//! shadows later ones on a name clash.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{Expr, FunctionDef};
use crate::cdef::meta::MetaEntity;
use crate::cdef::object::{CdefObject, ResolvedIndex};
use crate::error::{ErrorId, ExecError, ExecResult};
use crate::eval::TreeEvaluator;
use crate::value::Value;
use crate::walker::{self, TreeWalker};

/// Member access level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

impl Access {
    /// Parses an access attribute value (`public` / `protected` / `private`).
    pub fn parse(text: &str) -> ExecResult<Self> {
        match text {
            "public" => Ok(Self::Public),
            "protected" => Ok(Self::Protected),
            "private" => Ok(Self::Private),
            other => Err(ExecError::new(
                ErrorId::BadClassDef,
                format!("invalid access specifier '{other}'"),
            )),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
        }
    }
}

/// A declared property.
#[derive(Debug, Clone)]
pub struct CdefProperty {
    pub name: String,
    /// Name of the class that declared this property.
    pub owner: String,
    pub default: Option<Expr>,
    pub get_access: Access,
    pub set_access: Access,
    pub dependent: bool,
    pub constant: bool,
}

/// A declared method. The body is shared (`Rc<FunctionDef>`), so cloning a
/// method out of a table is cheap.
#[derive(Debug, Clone)]
pub struct CdefMethod {
    pub name: String,
    /// Name of the class that declared this method.
    pub owner: String,
    pub function: Rc<FunctionDef>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub access: Access,
    pub is_constructor: bool,
}

/// Selector for [`CdefClass::get_methods`] / [`CdefClass::get_properties`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberMode {
    /// Every visible member across the inheritance chain.
    All,
    /// Only members contributed by superclasses, excluding private ones.
    InheritedOnly,
}

struct ClassCore {
    name: String,
    superclasses: Vec<CdefClass>,
    methods: IndexMap<String, CdefMethod>,
    properties: IndexMap<String, CdefProperty>,
    is_abstract: bool,
    is_sealed: bool,
    is_handle: bool,
    is_meta: bool,
    member_count: usize,
    /// Direct superclasses whose constructor still runs implicitly (not
    /// explicitly chained by name in the constructor body).
    implicit_ctor_list: Vec<String>,
    /// Cached "empty representative" instance for meta classes.
    empty_instance: Option<CdefObject>,
}

/// A shared handle to class metadata.
#[derive(Clone)]
pub struct CdefClass {
    core: Rc<RefCell<ClassCore>>,
}

impl PartialEq for CdefClass {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for CdefClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CdefClass({})", self.core.borrow().name)
    }
}

impl CdefClass {
    #[must_use]
    pub fn new(name: impl Into<String>, superclasses: Vec<Self>) -> Self {
        let name = name.into();
        let is_handle = superclasses.iter().any(Self::is_handle);
        let implicit_ctor_list = superclasses.iter().map(Self::name).collect();
        Self {
            core: Rc::new(RefCell::new(ClassCore {
                name,
                superclasses,
                methods: IndexMap::new(),
                properties: IndexMap::new(),
                is_abstract: false,
                is_sealed: false,
                is_handle,
                is_meta: false,
                member_count: 0,
                implicit_ctor_list,
                empty_instance: None,
            })),
        }
    }

    /// The root `handle` base class every handle class ultimately inherits.
    #[must_use]
    pub fn root_handle() -> Self {
        let class = Self::new("handle", Vec::new());
        class.core.borrow_mut().is_handle = true;
        class.core.borrow_mut().is_abstract = true;
        class
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.core.borrow().name.clone()
    }

    #[must_use]
    pub fn is_handle(&self) -> bool {
        self.core.borrow().is_handle
    }

    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.core.borrow().is_abstract
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.core.borrow().is_sealed
    }

    #[must_use]
    pub fn is_meta(&self) -> bool {
        self.core.borrow().is_meta
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.core.borrow().member_count
    }

    pub(crate) fn set_abstract(&self, value: bool) {
        self.core.borrow_mut().is_abstract = value;
    }

    pub(crate) fn set_sealed(&self, value: bool) {
        self.core.borrow_mut().is_sealed = value;
    }

    pub(crate) fn set_meta(&self, value: bool) {
        self.core.borrow_mut().is_meta = value;
    }

    /// Direct superclasses in declaration order.
    #[must_use]
    pub fn superclasses(&self) -> Vec<Self> {
        self.core.borrow().superclasses.clone()
    }

    #[must_use]
    pub fn direct_superclass(&self, name: &str) -> Option<Self> {
        self.core
            .borrow()
            .superclasses
            .iter()
            .find(|sup| sup.name() == name)
            .cloned()
    }

    /// True if this class is `name` or inherits from it (at any depth).
    #[must_use]
    pub fn is_a(&self, name: &str) -> bool {
        if self.core.borrow().name == name {
            return true;
        }
        self.core.borrow().superclasses.iter().any(|s| s.is_a(name))
    }

    /// This class plus every ancestor, depth-first in declared order.
    #[must_use]
    pub fn ancestry(&self) -> Vec<Self> {
        let mut chain = vec![self.clone()];
        for sup in self.superclasses() {
            chain.extend(sup.ancestry());
        }
        chain
    }

    /// Direct superclasses whose constructor runs implicitly.
    #[must_use]
    pub fn implicit_ctor_list(&self) -> Vec<String> {
        self.core.borrow().implicit_ctor_list.clone()
    }

    // --- member resolution --------------------------------------------------

    /// Looks up a method by name: local table first, then superclasses
    /// depth-first in declared order. The first match wins. `local` restricts
    /// the search to this class. Absence is not an error.
    #[must_use]
    pub fn find_method(&self, name: &str, local: bool) -> Option<CdefMethod> {
        if let Some(method) = self.core.borrow().methods.get(name) {
            return Some(method.clone());
        }
        if local {
            return None;
        }
        self.superclasses()
            .iter()
            .find_map(|sup| sup.find_method(name, false))
    }

    /// Looks up a property with the same resolution order as methods.
    /// Properties and methods occupy separate namespaces.
    #[must_use]
    pub fn find_property(&self, name: &str) -> Option<CdefProperty> {
        if let Some(prop) = self.core.borrow().properties.get(name) {
            return Some(prop.clone());
        }
        self.superclasses()
            .iter()
            .find_map(|sup| sup.find_property(name))
    }

    /// The local constructor method, if one was installed.
    #[must_use]
    pub fn constructor(&self) -> Option<CdefMethod> {
        self.core
            .borrow()
            .methods
            .values()
            .find(|m| m.is_constructor)
            .cloned()
    }

    /// Installs a method into the local table. Installing the constructor
    /// statically scans its body for explicit superclass-constructor calls
    /// and removes every superclass so named from the implicit constructor
    /// list. The scan is conservative (purely syntactic): a superclass call
    /// reachable only on some code paths still counts as explicit.
    pub fn install_method(&self, method: CdefMethod) {
        if method.is_constructor {
            if let Some(output) = method.function.outputs.first() {
                let explicit = scan_explicit_super_ctors(&method.function, output);
                self.core
                    .borrow_mut()
                    .implicit_ctor_list
                    .retain(|sup| !explicit.contains(sup));
            }
        }
        let mut core = self.core.borrow_mut();
        core.member_count += 1;
        core.methods.insert(method.name.clone(), method);
    }

    /// Installs a property into the local table.
    pub fn install_property(&self, property: CdefProperty) {
        let mut core = self.core.borrow_mut();
        core.member_count += 1;
        core.properties.insert(property.name.clone(), property);
    }

    /// De-duplicated method list across the inheritance chain; on a name
    /// clash the subclass (or leftmost superclass) entry wins.
    #[must_use]
    pub fn get_methods(&self, mode: MemberMode) -> Vec<CdefMethod> {
        let mut seen = IndexMap::new();
        self.collect_methods(&mut seen, mode == MemberMode::InheritedOnly);
        seen.into_values().collect()
    }

    fn collect_methods(&self, seen: &mut IndexMap<String, CdefMethod>, skip_local: bool) {
        if !skip_local {
            for method in self.core.borrow().methods.values() {
                seen.entry(method.name.clone()).or_insert_with(|| method.clone());
            }
        } else {
            // inherited-only: descend, filtering private superclass members
            for sup in self.superclasses() {
                for method in sup.get_methods(MemberMode::All) {
                    if method.access != Access::Private {
                        seen.entry(method.name.clone()).or_insert(method);
                    }
                }
            }
            return;
        }
        for sup in self.superclasses() {
            sup.collect_methods(seen, false);
        }
    }

    /// De-duplicated property list across the inheritance chain.
    #[must_use]
    pub fn get_properties(&self, mode: MemberMode) -> Vec<CdefProperty> {
        let mut seen: IndexMap<String, CdefProperty> = IndexMap::new();
        match mode {
            MemberMode::All => {
                for class in self.ancestry() {
                    for prop in class.core.borrow().properties.values() {
                        seen.entry(prop.name.clone()).or_insert_with(|| prop.clone());
                    }
                }
            }
            MemberMode::InheritedOnly => {
                for sup in self.superclasses() {
                    for prop in sup.get_properties(MemberMode::All) {
                        if prop.get_access != Access::Private {
                            seen.entry(prop.name.clone()).or_insert(prop);
                        }
                    }
                }
            }
        }
        seen.into_values().collect()
    }

    /// True if a member with the given access level is reachable from the
    /// evaluator's current class context.
    pub(crate) fn member_accessible(owner: &str, access: Access, ev: &TreeEvaluator) -> bool {
        match access {
            Access::Public => true,
            Access::Protected => ev
                .current_class_context()
                .is_some_and(|ctx| ctx.is_a(owner)),
            Access::Private => ev
                .current_class_context()
                .is_some_and(|ctx| ctx.name() == owner),
        }
    }

    // --- construction -------------------------------------------------------

    /// Default-initializes `obj` for this class: superclasses first (so
    /// subclass defaults may reference inherited state), then every
    /// non-dependent, non-constant local property gets its default value or
    /// an empty value, then the object is marked pending construction.
    pub fn initialize_object(&self, ev: &mut TreeEvaluator, obj: &CdefObject) -> ExecResult<()> {
        // Later writes win per slot, so visit sibling superclasses in reverse
        // declaration order: a property two siblings both declare ends up
        // with the first-declared sibling's default, matching lookup order.
        for sup in self.superclasses().into_iter().rev() {
            sup.initialize_object(ev, obj)?;
        }
        let defaults: Vec<(String, Option<Expr>)> = self
            .core
            .borrow()
            .properties
            .values()
            .filter(|p| !p.dependent && !p.constant)
            .map(|p| (p.name.clone(), p.default.clone()))
            .collect();
        for (name, default) in defaults {
            let value = match default {
                Some(expr) => ev.eval_expr_isolated(&expr)?,
                None => Value::Empty,
            };
            obj.put(&name, value)?;
        }
        obj.mark_for_construction(self)
    }

    /// Runs constructors bottom-up: every superclass still on the implicit
    /// list first (with no arguments), then this class's own constructor with
    /// the object pre-bound to its declared output variable. The declared
    /// output becomes the (possibly replaced) object.
    pub fn run_constructor(
        &self,
        ev: &mut TreeEvaluator,
        obj: &mut CdefObject,
        args: &[Value],
    ) -> ExecResult<()> {
        for sup_name in self.implicit_ctor_list() {
            let sup = self.direct_superclass(&sup_name).ok_or_else(|| {
                ExecError::new(
                    ErrorId::BadClassDef,
                    format!("unknown superclass '{sup_name}' of class '{}'", self.name()),
                )
            })?;
            sup.run_constructor(ev, obj, &[])?;
        }
        if let Some(ctor) = self.constructor() {
            if ctor.function.outputs.len() != 1 {
                return Err(ExecError::new(
                    ErrorId::BadConstructor,
                    format!(
                        "constructor of class '{}' must declare exactly one output",
                        self.name()
                    ),
                ));
            }
            *obj = ev.execute_constructor(self, &ctor, obj.clone(), args)?;
        }
        obj.mark_as_constructed_for(&self.name())
    }

    /// Builds a fresh, fully constructed instance.
    pub fn construct_object(&self, ev: &mut TreeEvaluator, args: &[Value]) -> ExecResult<CdefObject> {
        if self.is_abstract() {
            return Err(ExecError::new(
                ErrorId::AbstractInstantiation,
                format!("cannot instantiate abstract class '{}'", self.name()),
            ));
        }
        if self.is_meta() {
            return Ok(self.empty_instance());
        }
        let mut obj = CdefObject::new_scalar(self.clone(), self.is_handle());
        self.initialize_object(ev, &obj)?;
        self.run_constructor(ev, &mut obj, args)?;
        obj.mark_fully_constructed()?;
        Ok(obj)
    }

    /// The cached "empty representative" instance used as array filler for
    /// meta classes. Never a real, constructed instance.
    #[must_use]
    pub fn empty_instance(&self) -> CdefObject {
        if let Some(cached) = &self.core.borrow().empty_instance {
            return cached.clone();
        }
        let empty = CdefObject::new_scalar(self.clone(), true);
        self.core.borrow_mut().empty_instance = Some(empty.clone());
        empty
    }

    /// The `meta.class` reflection object for this class.
    #[must_use]
    pub fn meta_object(&self) -> CdefObject {
        CdefObject::new_meta(MetaEntity::Class(self.clone()))
    }

    /// Static member access and constructor-call dispatch for
    /// `ClassName(...)` / `ClassName.member`. Returns the produced values and
    /// the number of index operations consumed; the caller applies any
    /// remaining operations generically.
    pub fn meta_subsref(
        &self,
        ev: &mut TreeEvaluator,
        ops: &[ResolvedIndex],
        nargout: usize,
    ) -> ExecResult<(Vec<Value>, usize)> {
        let Some(first) = ops.first() else {
            return Err(ExecError::new(
                ErrorId::BadOperation,
                format!("class '{}' referenced without an index operation", self.name()),
            ));
        };
        match first {
            ResolvedIndex::Paren(args) => {
                let obj = self.construct_object(ev, args)?;
                Ok((vec![Value::Object(obj)], 1))
            }
            ResolvedIndex::Brace(_) => Err(ExecError::new(
                ErrorId::BadOperation,
                format!("'{{}}' indexing is undefined for class '{}'", self.name()),
            )),
            ResolvedIndex::Dot(member) => {
                if let Some(method) = self.find_method(member, false) {
                    if !method.is_static {
                        return Err(ExecError::new(
                            ErrorId::StaticAccess,
                            format!(
                                "method '{member}' of class '{}' is not static",
                                self.name()
                            ),
                        ));
                    }
                    if !Self::member_accessible(&method.owner, method.access, ev) {
                        return Err(ExecError::new(
                            ErrorId::PrivateAccess,
                            format!("method '{member}' of class '{}' is not accessible", self.name()),
                        ));
                    }
                    let (args, consumed) = match ops.get(1) {
                        Some(ResolvedIndex::Paren(args)) => (args.clone(), 2),
                        _ => (Vec::new(), 1),
                    };
                    let values = ev.call_cdef_method(&method, args, nargout)?;
                    Ok((values, consumed))
                } else if let Some(prop) = self.find_property(member) {
                    if !prop.constant {
                        return Err(ExecError::new(
                            ErrorId::ConstantAccess,
                            format!(
                                "property '{member}' of class '{}' is not constant",
                                self.name()
                            ),
                        ));
                    }
                    if !Self::member_accessible(&prop.owner, prop.get_access, ev) {
                        return Err(ExecError::new(
                            ErrorId::PrivateAccess,
                            format!("property '{member}' of class '{}' is not accessible", self.name()),
                        ));
                    }
                    Ok((vec![self.constant_value(ev, &prop)?], 1))
                } else {
                    Err(ExecError::new(
                        ErrorId::UndefinedMember,
                        format!("class '{}' has no member '{member}'", self.name()),
                    ))
                }
            }
        }
    }

    /// Evaluates a constant property's value. Constants are class-level:
    /// the default expression is their value and no per-object slot exists.
    pub fn constant_value(&self, ev: &mut TreeEvaluator, prop: &CdefProperty) -> ExecResult<Value> {
        match &prop.default {
            Some(expr) => ev.eval_expr_isolated(expr),
            None => Ok(Value::Empty),
        }
    }

    /// Runs the cooperative destruction chain: the local `delete` method if
    /// present, then every superclass except the root `handle` base. There is
    /// no implicit finalizer; dropping the last reference runs nothing.
    pub fn delete_object(&self, ev: &mut TreeEvaluator, obj: &CdefObject) -> ExecResult<()> {
        if let Some(del) = self.find_method("delete", true) {
            if !del.is_constructor {
                ev.call_cdef_method_on(&del, obj, &[], 0)?;
            }
        }
        for sup in self.superclasses() {
            if sup.name() != "handle" {
                sup.delete_object(ev, obj)?;
            }
        }
        Ok(())
    }
}

/// Collects the superclasses a constructor body explicitly chains by name:
/// `output@Super(...)` references whose target identifier is the declared
/// constructor output variable.
fn scan_explicit_super_ctors(function: &FunctionDef, output: &str) -> Vec<String> {
    struct Scan<'a> {
        output: &'a str,
        found: Vec<String>,
    }

    impl TreeWalker for Scan<'_> {
        fn visit_expr(&mut self, expr: &crate::ast::Expr) {
            if let crate::ast::ExprKind::Superclass { ident, class, .. } = &expr.kind {
                if ident == self.output && !self.found.contains(class) {
                    self.found.push(class.clone());
                }
            }
            walker::walk_expr(self, expr);
        }
    }

    let mut scan = Scan {
        output,
        found: Vec::new(),
    };
    for stmt in &function.body {
        scan.visit_stmt(stmt);
    }
    scan.found
}
