//! Member resolution across inheritance hierarchies, including diamonds,
//! and classdef validation at definition time.

use pretty_assertions::assert_eq;

use octavo::ast::{
    Attr, ClassDef, Expr, ExprKind, FunctionDef, IndexOp, MethodBlock, PropertyBlock,
    PropertyDecl, Stmt,
};
use octavo::{ErrorId, NoOutput, TreeEvaluator, Value};

fn ev() -> TreeEvaluator {
    let mut ev = TreeEvaluator::new();
    ev.set_output(Box::new(NoOutput));
    ev
}

/// A class whose `whoami` method returns `answer`, so tests can observe
/// which class's method resolution picked.
fn class_with_whoami(name: &str, superclasses: &[&str], answer: Option<&str>) -> ClassDef {
    let methods = match answer {
        Some(answer) => vec![FunctionDef {
            name: "whoami".to_owned(),
            params: vec!["obj".to_owned()],
            outputs: vec!["s".to_owned()],
            body: vec![Stmt::assign("s", Expr::str(answer))],
            is_script: false,
        }],
        None => Vec::new(),
    };
    ClassDef {
        name: name.to_owned(),
        superclasses: superclasses.iter().map(|&s| s.to_owned()).collect(),
        attributes: Vec::new(),
        property_blocks: Vec::new(),
        method_blocks: vec![MethodBlock {
            attributes: Vec::new(),
            methods,
        }],
    }
}

fn whoami_of(var: &str) -> Expr {
    Expr::new(ExprKind::Index {
        base: Box::new(Expr::ident(var)),
        ops: vec![
            IndexOp::Dot("whoami".to_owned()),
            IndexOp::Paren(Vec::new()),
        ],
    })
}

/// In a diamond `D < A, B` where both `A` and `B` override a root method,
/// the first-declared superclass wins.
#[test]
fn diamond_resolves_to_first_declared_superclass() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Root", &[], Some("Root"))).unwrap();
    ev.define_class(&class_with_whoami("A", &["Root"], Some("A"))).unwrap();
    ev.define_class(&class_with_whoami("B", &["Root"], Some("B"))).unwrap();
    ev.define_class(&class_with_whoami("D", &["A", "B"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("d", Expr::call("D", Vec::new())),
        Stmt::assign("who", whoami_of("d")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("who"), Some(Value::Str("A".to_owned())));
}

/// Declaration order, not specificity, decides: flipping the superclass
/// list flips the winner.
#[test]
fn superclass_order_decides_resolution() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Root", &[], Some("Root"))).unwrap();
    ev.define_class(&class_with_whoami("A", &["Root"], Some("A"))).unwrap();
    ev.define_class(&class_with_whoami("B", &["Root"], Some("B"))).unwrap();
    ev.define_class(&class_with_whoami("E", &["B", "A"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("e", Expr::call("E", Vec::new())),
        Stmt::assign("who", whoami_of("e")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("who"), Some(Value::Str("B".to_owned())));
}

/// A class declaring property `p` with the given default, for property
/// diamond fixtures.
fn class_with_default(name: &str, superclasses: &[&str], default: Option<i64>) -> ClassDef {
    let property_blocks = match default {
        Some(value) => vec![PropertyBlock {
            attributes: Vec::new(),
            properties: vec![PropertyDecl {
                name: "p".to_owned(),
                default: Some(Expr::int(value)),
            }],
        }],
        None => Vec::new(),
    };
    ClassDef {
        name: name.to_owned(),
        superclasses: superclasses.iter().map(|&s| s.to_owned()).collect(),
        attributes: Vec::new(),
        property_blocks,
        method_blocks: Vec::new(),
    }
}

/// When both sides of a diamond declare the same property with different
/// defaults, the first-declared superclass wins: its declaration resolves
/// the read and its default survives initialization.
#[test]
fn diamond_property_default_takes_first_declared_superclass() {
    let mut ev = ev();
    ev.define_class(&class_with_default("A", &[], Some(1))).unwrap();
    ev.define_class(&class_with_default("B", &[], Some(2))).unwrap();
    ev.define_class(&class_with_default("D", &["A", "B"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("d", Expr::call("D", Vec::new())),
        Stmt::assign("p", Expr::field(Expr::ident("d"), "p")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("p"), Some(Value::Int(1)));
}

/// A method defined only on a distant ancestor is still reachable.
#[test]
fn inherited_method_found_through_chain() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Root", &[], Some("Root"))).unwrap();
    ev.define_class(&class_with_whoami("Mid", &["Root"], None)).unwrap();
    ev.define_class(&class_with_whoami("Leaf", &["Mid"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("x", Expr::call("Leaf", Vec::new())),
        Stmt::assign("who", whoami_of("x")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("who"), Some(Value::Str("Root".to_owned())));
}

/// A local override shadows the inherited definition.
#[test]
fn subclass_override_shadows_superclass() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Root", &[], Some("Root"))).unwrap();
    ev.define_class(&class_with_whoami("Loud", &["Root"], Some("Loud"))).unwrap();
    ev.eval_statements(&[
        Stmt::assign("x", Expr::call("Loud", Vec::new())),
        Stmt::assign("who", whoami_of("x")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("who"), Some(Value::Str("Loud".to_owned())));
}

/// Handle semantics are inherited transitively through user classes.
#[test]
fn handle_semantics_inherited_transitively() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Gadget", &["handle"], None)).unwrap();
    ev.define_class(&class_with_whoami("Widget", &["Gadget"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("w", Expr::call("Widget", Vec::new())),
        Stmt::assign(
            "h",
            Expr::call("isa", vec![Expr::ident("w"), Expr::str("handle")]),
        ),
        Stmt::assign(
            "g",
            Expr::call("isa", vec![Expr::ident("w"), Expr::str("Gadget")]),
        ),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("h"), Some(Value::Bool(true)));
    assert_eq!(ev.lookup_variable("g"), Some(Value::Bool(true)));
}

/// Referring to an unknown superclass fails at definition time.
#[test]
fn undefined_superclass_rejected_at_definition() {
    let mut ev = ev();
    let err = ev
        .define_class(&class_with_whoami("Orphan", &["NoSuchBase"], None))
        .unwrap_err();
    assert!(err.is(ErrorId::BadClassDef), "got {err}");
}

/// A Sealed class cannot be subclassed.
#[test]
fn sealed_class_cannot_be_subclassed() {
    let mut ev = ev();
    ev.define_class(&ClassDef {
        name: "Final".to_owned(),
        superclasses: Vec::new(),
        attributes: vec![Attr::flag("Sealed")],
        property_blocks: Vec::new(),
        method_blocks: Vec::new(),
    })
    .unwrap();
    let err = ev
        .define_class(&class_with_whoami("Breaker", &["Final"], None))
        .unwrap_err();
    assert!(err.is(ErrorId::BadClassDef), "got {err}");
}

/// An unknown class attribute fails at definition time.
#[test]
fn unknown_class_attribute_rejected() {
    let mut ev = ev();
    let err = ev
        .define_class(&ClassDef {
            name: "Odd".to_owned(),
            superclasses: Vec::new(),
            attributes: vec![Attr::flag("Shiny")],
            property_blocks: Vec::new(),
            method_blocks: Vec::new(),
        })
        .unwrap_err();
    assert!(err.is(ErrorId::BadClassDef), "got {err}");
}

/// The meta object exposes the declared superclass list in order.
#[test]
fn metaclass_superclass_list_preserves_order() {
    let mut ev = ev();
    ev.define_class(&class_with_whoami("Root", &[], Some("Root"))).unwrap();
    ev.define_class(&class_with_whoami("A", &["Root"], None)).unwrap();
    ev.define_class(&class_with_whoami("B", &["Root"], None)).unwrap();
    ev.define_class(&class_with_whoami("D", &["A", "B"], None)).unwrap();
    ev.eval_statements(&[
        Stmt::assign("m", Expr::new(ExprKind::Metaclass("D".to_owned()))),
        Stmt::assign(
            "supers",
            Expr::field(Expr::ident("m"), "SuperclassList"),
        ),
        Stmt::assign(
            "n",
            Expr::call("numel", vec![Expr::ident("supers")]),
        ),
        Stmt::assign(
            "first",
            Expr::field(
                Expr::new(ExprKind::Index {
                    base: Box::new(Expr::ident("supers")),
                    ops: vec![IndexOp::Brace(vec![Expr::int(1)])],
                }),
                "Name",
            ),
        ),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("n"), Some(Value::Int(2)));
    assert_eq!(ev.lookup_variable("first"), Some(Value::Str("A".to_owned())));
}

/// A `classdef` statement in the stream defines the class like
/// `define_class` does.
#[test]
fn classdef_statement_registers_the_class() {
    let mut ev = ev();
    ev.eval_statements(&[
        Stmt::new(octavo::ast::StmtKind::ClassDef(class_with_whoami(
            "Inline",
            &[],
            Some("Inline"),
        ))),
        Stmt::assign("x", Expr::call("Inline", Vec::new())),
        Stmt::assign("who", whoami_of("x")),
    ])
    .unwrap();
    assert_eq!(ev.lookup_variable("who"), Some(Value::Str("Inline".to_owned())));
}
