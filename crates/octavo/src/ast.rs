//! Parsed syntax trees consumed by the evaluator.
//!
//! octavo does not ship a parser; the types here are the contract a parser
//! (or a host embedding octavo) must produce. Node kinds are closed sum
//! types dispatched by pattern matching; the [`crate::walker::TreeWalker`]
//! trait layers a per-kind visitor with default traversal on top.
//!
//! All nodes derive serde so hosts can cache parsed trees between sessions.

use serde::{Deserialize, Serialize};

/// Source position of a node, 1-based. `line == 0` means "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A statement (or command, in MATLAB terminology) with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: CodeLoc,
}

/// The closed set of statement kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// A bare expression; `suppressed` is true when terminated with `;`.
    Expression { expr: Expr, suppressed: bool },
    /// `[a, b(2), ~] = rhs` or plain `x = rhs`.
    Assign {
        targets: Vec<LValue>,
        rhs: Expr,
        suppressed: bool,
    },
    /// `if`/`elseif` clause chain plus optional `else` body.
    If {
        clauses: Vec<IfClause>,
        else_body: Vec<Stmt>,
    },
    /// `switch` with case labels and an optional `otherwise` body.
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        otherwise: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// `do ... until cond` (body runs at least once).
    DoUntil { body: Vec<Stmt>, cond: Expr },
    /// `for var = iterable` over a range, matrix columns or cell elements.
    SimpleFor {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    /// `for [a, b] = iterable`: binds one variable per matrix row each
    /// column iteration.
    ComplexFor {
        vars: Vec<String>,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Return,
    /// `try ... catch err ... end`; `err_ident` is the caught-error binding.
    TryCatch {
        body: Vec<Stmt>,
        err_ident: Option<String>,
        catch_body: Vec<Stmt>,
    },
    /// `unwind_protect body unwind_protect_cleanup cleanup end`.
    UnwindProtect { body: Vec<Stmt>, cleanup: Vec<Stmt> },
    /// `global a b c`.
    Global { names: Vec<String> },
    /// `persistent a b c`.
    Persistent { names: Vec<String> },
    /// Command syntax: `format long` parses as `Command("format", ["long"])`.
    Command { name: String, args: Vec<String> },
    /// A function definition encountered in the statement stream.
    FunctionDef(FunctionDef),
    /// A `classdef` block.
    ClassDef(ClassDef),
    /// Empty statement (stray semicolons, blank continuations).
    NoOp,
}

/// One `if`/`elseif` arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfClause {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

/// One `case` arm; `labels` holds one expression per brace-list alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub labels: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// An assignment target. MATLAB lvalues are always an identifier with an
/// optional trailing index chain; `~` discards the corresponding output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LValue {
    /// `~` placeholder: the output value is evaluated and dropped.
    Ignored,
    Var { name: String, index: Vec<IndexOp> },
}

/// An expression with its source position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: CodeLoc,
}

/// The closed set of expression kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Num(f64),
    Int(i64),
    Str(String),
    Bool(bool),
    Ident(String),
    /// The magic colon, valid only inside an index list.
    Colon,
    /// The `end` keyword, resolved against the enclosing indexing context.
    End,
    /// `start:stop` or `start:step:stop`.
    Range {
        start: Box<Expr>,
        step: Option<Box<Expr>>,
        stop: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// Postfix operators (transpose).
    Postfix {
        op: PostfixOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `&&` / `||`: the right operand is evaluated conditionally.
    ShortCircuit {
        op: ShortCircuitOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// An index/call chain: `a.b(3).c`, `f(x)`, `c{2}`. MATLAB cannot
    /// distinguish call from index at parse time, so neither do we.
    Index {
        base: Box<Expr>,
        ops: Vec<IndexOp>,
    },
    /// `[1 2; 3 4]` — rows of element expressions.
    Matrix { rows: Vec<Vec<Expr>> },
    /// `{1, 'two'; 3, 4}` — rows of cell element expressions.
    Cell { rows: Vec<Vec<Expr>> },
    /// `@name`.
    FnHandle(String),
    /// `@(x, y) x + y`.
    AnonFn {
        params: Vec<String>,
        body: Box<Expr>,
    },
    /// `ident@Class(args)`: a superclass constructor call (when `ident` is
    /// the constructor output variable) or a superclass method call.
    Superclass {
        ident: String,
        class: String,
        args: Vec<Expr>,
    },
    /// `?ClassName` — metaclass query.
    Metaclass(String),
}

/// One step of an index/call chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndexOp {
    /// `( ... )` — call or array index.
    Paren(Vec<Expr>),
    /// `{ ... }` — cell content index.
    Brace(Vec<Expr>),
    /// `.name` — member access.
    Dot(String),
    /// `.(expr)` — dynamic member access.
    DynDot(Box<Expr>),
}

impl IndexOp {
    /// Short tag used in error messages (`"()"`, `"{}"`, `"."`).
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Paren(_) => "()",
            Self::Brace(_) => "{}",
            Self::Dot(_) | Self::DynDot(_) => ".",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostfixOp {
    Transpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShortCircuitOp {
    AndAnd,
    OrOr,
}

/// A user function (or script) definition.
///
/// A trailing parameter named `varargin` collects overflow positional
/// arguments into a cell; a trailing output named `varargout` expands a cell
/// into the remaining requested outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub outputs: Vec<String>,
    pub body: Vec<Stmt>,
    /// Scripts execute in a frame of their own but have no parameter list.
    pub is_script: bool,
}

/// A named attribute with an optional value expression, as appears in
/// classdef attribute lists: `(Abstract = true, Sealed)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attr {
    pub name: String,
    pub value: Option<Expr>,
}

impl Attr {
    #[must_use]
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    #[must_use]
    pub fn valued(name: impl Into<String>, value: Expr) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }
}

/// One declared property inside a `properties` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub default: Option<Expr>,
}

/// A `properties (...attrs...)` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyBlock {
    pub attributes: Vec<Attr>,
    pub properties: Vec<PropertyDecl>,
}

/// A `methods (...attrs...)` block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodBlock {
    pub attributes: Vec<Attr>,
    pub methods: Vec<FunctionDef>,
}

/// A parsed `classdef` block — the exact shape the class builder
/// ([`crate::cdef::make_meta_class`]) consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    /// Direct superclasses in declaration order (order decides member
    /// resolution priority).
    pub superclasses: Vec<String>,
    pub attributes: Vec<Attr>,
    pub property_blocks: Vec<PropertyBlock>,
    pub method_blocks: Vec<MethodBlock>,
}

impl ClassDef {
    /// The class name.
    #[must_use]
    pub fn ident(&self) -> &str {
        &self.name
    }

    /// Direct superclasses in declaration order.
    #[must_use]
    pub fn superclass_list(&self) -> &[String] {
        &self.superclasses
    }

    /// Class-level attributes.
    #[must_use]
    pub fn attribute_list(&self) -> &[Attr] {
        &self.attributes
    }

    /// All property declarations across blocks, paired with block attributes.
    pub fn properties_list(&self) -> impl Iterator<Item = (&PropertyBlock, &PropertyDecl)> {
        self.property_blocks
            .iter()
            .flat_map(|block| block.properties.iter().map(move |p| (block, p)))
    }

    /// All method definitions across blocks, paired with block attributes.
    pub fn methods_list(&self) -> impl Iterator<Item = (&MethodBlock, &FunctionDef)> {
        self.method_blocks
            .iter()
            .flat_map(|block| block.methods.iter().map(move |m| (block, m)))
    }
}

// --- construction helpers ---------------------------------------------------
//
// Hosts (and our own tests) build trees programmatically; these helpers keep
// that readable without a parser.

impl Stmt {
    #[must_use]
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            loc: CodeLoc::default(),
        }
    }

    #[must_use]
    pub fn at(mut self, line: u32) -> Self {
        self.loc = CodeLoc::new(line, 1);
        self
    }

    /// A suppressed single-target assignment: `name = rhs;`.
    #[must_use]
    pub fn assign(name: impl Into<String>, rhs: Expr) -> Self {
        Self::new(StmtKind::Assign {
            targets: vec![LValue::Var {
                name: name.into(),
                index: Vec::new(),
            }],
            rhs,
            suppressed: true,
        })
    }

    /// An unsuppressed expression statement (binds `ans`, echoes).
    #[must_use]
    pub fn expression(expr: Expr) -> Self {
        Self::new(StmtKind::Expression {
            expr,
            suppressed: false,
        })
    }

    /// A suppressed expression statement.
    #[must_use]
    pub fn expression_suppressed(expr: Expr) -> Self {
        Self::new(StmtKind::Expression {
            expr,
            suppressed: true,
        })
    }
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind) -> Self {
        Self {
            kind,
            loc: CodeLoc::default(),
        }
    }

    #[must_use]
    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value))
    }

    #[must_use]
    pub fn num(value: f64) -> Self {
        Self::new(ExprKind::Num(value))
    }

    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::new(ExprKind::Str(value.into()))
    }

    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value))
    }

    #[must_use]
    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(ExprKind::Ident(name.into()))
    }

    #[must_use]
    pub fn range(start: Self, stop: Self) -> Self {
        Self::new(ExprKind::Range {
            start: Box::new(start),
            step: None,
            stop: Box::new(stop),
        })
    }

    #[must_use]
    pub fn binary(op: BinaryOp, lhs: Self, rhs: Self) -> Self {
        Self::new(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    /// A call/index chain with a single paren group: `name(args...)`.
    #[must_use]
    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::new(ExprKind::Index {
            base: Box::new(Self::ident(name)),
            ops: vec![IndexOp::Paren(args)],
        })
    }

    /// Member access chain: `name.field`.
    #[must_use]
    pub fn field(base: Self, field: impl Into<String>) -> Self {
        Self::new(ExprKind::Index {
            base: Box::new(base),
            ops: vec![IndexOp::Dot(field.into())],
        })
    }
}
