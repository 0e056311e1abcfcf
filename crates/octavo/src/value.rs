//! Runtime values.
//!
//! Aggregate values (matrices, cells, anonymous-function closures) are
//! refcounted and copy-on-write: cloning a [`Value`] is always cheap, and
//! mutation goes through `Rc::make_mut`-style paths at the assignment sites.
//! classdef objects carry their own sharing rules ([`CdefObject`]), so
//! [`Value::clone_for_assign`] is the one place MATLAB assignment semantics
//! (handle aliasing vs. value copying) are applied.

use std::fmt::{self, Display, Write};
use std::rc::Rc;

use crate::ast::Expr;
use crate::cdef::CdefObject;
use crate::error::{ErrorId, ExecError, ExecResult};

/// A dense, column-major numeric matrix.
///
/// This crate treats matrices as opaque containers: construction, indexing
/// and display are supported; arithmetic kernels live outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    /// Column-major storage, `rows * cols` elements.
    pub data: Vec<f64>,
}

impl Matrix {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            rows: 0,
            cols: 0,
            data: Vec::new(),
        }
    }

    /// A 1-by-n row vector.
    #[must_use]
    pub fn row(data: Vec<f64>) -> Self {
        Self {
            rows: usize::from(!data.is_empty()),
            cols: data.len(),
            data,
        }
    }

    #[must_use]
    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    /// Linear (1-based) element read.
    pub fn get_linear(&self, index: usize) -> ExecResult<f64> {
        if index == 0 || index > self.numel() {
            return Err(ExecError::new(
                ErrorId::BadIndex,
                format!("index {index} out of bound {}", self.numel()),
            ));
        }
        Ok(self.data[index - 1])
    }
}

/// The closure state of an anonymous function: parameter list, body and the
/// values of free variables captured at definition time.
#[derive(Debug, Clone, PartialEq)]
pub struct AnonClosure {
    pub params: Vec<String>,
    pub body: Expr,
    pub captures: indexmap::IndexMap<String, Value>,
}

/// A function handle value.
#[derive(Debug, Clone, PartialEq)]
pub enum FnHandleValue {
    /// `@name` — resolved by name at call time.
    Named(String),
    /// `@(args) expr` — carries its captured environment.
    Anon(Rc<AnonClosure>),
}

/// A runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The empty array `[]`; also the value of never-assigned properties.
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
    /// A lazily-materialized `start:step:stop` range.
    Range { start: f64, step: f64, stop: f64 },
    Matrix(Rc<Matrix>),
    Cell(Rc<Vec<Value>>),
    FnHandle(FnHandleValue),
    /// A classdef object (scalar, array or meta-object).
    Object(CdefObject),
    /// A caught error, as bound by `catch err`.
    Exception(Rc<ExecError>),
}

impl Value {
    /// The name `class(x)` reports for this value.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Empty | Self::Num(_) | Self::Range { .. } | Self::Matrix(_) => {
                "double".to_owned()
            }
            Self::Bool(_) => "logical".to_owned(),
            Self::Int(_) => "int64".to_owned(),
            Self::Str(_) => "char".to_owned(),
            Self::Cell(_) => "cell".to_owned(),
            Self::FnHandle(_) => "function_handle".to_owned(),
            Self::Object(obj) => obj.class_name().unwrap_or_else(|_| "handle".to_owned()),
            Self::Exception(_) => "MException".to_owned(),
        }
    }

    /// Condition-context truthiness: all elements nonzero, and nonempty.
    pub fn is_truthy(&self) -> ExecResult<bool> {
        match self {
            Self::Empty => Ok(false),
            Self::Bool(b) => Ok(*b),
            Self::Int(i) => Ok(*i != 0),
            Self::Num(n) => Ok(*n != 0.0),
            Self::Str(s) => Ok(!s.is_empty() && s.bytes().all(|b| b != 0)),
            Self::Range { .. } | Self::Matrix(_) => {
                let n = self.numel();
                if n == 0 {
                    return Ok(false);
                }
                match self {
                    Self::Matrix(m) => Ok(m.data.iter().all(|&x| x != 0.0)),
                    Self::Range { start, step, stop } => {
                        Ok(range_values(*start, *step, *stop).all(|x| x != 0.0))
                    }
                    _ => unreachable!(),
                }
            }
            Self::Cell(_) | Self::FnHandle(_) | Self::Object(_) | Self::Exception(_) => {
                Err(ExecError::new(
                    ErrorId::WrongType,
                    format!("{} value used in a condition", self.type_name()),
                ))
            }
        }
    }

    /// Element count, as `numel` reports it.
    #[must_use]
    pub fn numel(&self) -> usize {
        match self {
            Self::Empty => 0,
            Self::Bool(_) | Self::Int(_) | Self::Num(_) | Self::FnHandle(_) | Self::Exception(_) => 1,
            Self::Str(s) => s.chars().count(),
            Self::Range { start, step, stop } => range_len(*start, *step, *stop),
            Self::Matrix(m) => m.numel(),
            Self::Cell(c) => c.len(),
            Self::Object(obj) => obj.numel(),
        }
    }

    /// Size along a 1-based dimension, as `end` resolution needs it.
    /// Scalars and strings are treated as 1-by-n row shapes.
    #[must_use]
    pub fn dim_len(&self, dim: usize) -> usize {
        match self {
            Self::Matrix(m) => match dim {
                1 => m.rows,
                2 => m.cols,
                _ => 1,
            },
            _ => match dim {
                1 => usize::from(self.numel() > 0),
                2 => self.numel(),
                _ => 1,
            },
        }
    }

    /// The value stored by `target = self`, applying handle/value semantics
    /// for objects. Non-object values share refcounted payloads and diverge
    /// lazily on mutation.
    #[must_use]
    pub fn clone_for_assign(&self) -> Self {
        match self {
            Self::Object(obj) => Self::Object(obj.clone_object()),
            other => other.clone(),
        }
    }

    /// Numeric coercion for index arithmetic and range endpoints.
    pub fn as_num(&self) -> ExecResult<f64> {
        match self {
            Self::Bool(b) => Ok(f64::from(*b)),
            Self::Int(i) => Ok(*i as f64),
            Self::Num(n) => Ok(*n),
            Self::Matrix(m) if m.numel() == 1 => Ok(m.data[0]),
            other => Err(ExecError::new(
                ErrorId::WrongType,
                format!("expected a numeric scalar, got {}", other.type_name()),
            )),
        }
    }

    /// String coercion for identifiers, labels and messages.
    pub fn as_str(&self) -> ExecResult<&str> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(ExecError::new(
                ErrorId::WrongType,
                format!("expected a string, got {}", other.type_name()),
            )),
        }
    }

    /// Materializes ranges and scalar numbers into the vector of their
    /// elements, for `for` iteration and matrix literals.
    pub fn iter_columns(&self) -> ExecResult<Vec<Self>> {
        match self {
            Self::Empty => Ok(Vec::new()),
            Self::Bool(_) | Self::Int(_) | Self::Num(_) | Self::Str(_) => Ok(vec![self.clone()]),
            Self::Range { start, step, stop } => {
                Ok(range_values(*start, *step, *stop).map(Self::Num).collect())
            }
            Self::Matrix(m) => Ok((0..m.cols)
                .map(|c| {
                    let col: Vec<f64> = (0..m.rows).map(|r| m.data[c * m.rows + r]).collect();
                    if col.len() == 1 {
                        Self::Num(col[0])
                    } else {
                        Self::Matrix(Rc::new(Matrix {
                            rows: col.len(),
                            cols: 1,
                            data: col,
                        }))
                    }
                })
                .collect()),
            Self::Cell(c) => Ok(c.iter().cloned().collect()),
            other => Err(ExecError::new(
                ErrorId::WrongType,
                format!("cannot iterate over a {}", other.type_name()),
            )),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Empty, Self::Empty) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::Int(a), Self::Num(b)) | (Self::Num(b), Self::Int(a)) => *a as f64 == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (
                Self::Range {
                    start: a1,
                    step: a2,
                    stop: a3,
                },
                Self::Range {
                    start: b1,
                    step: b2,
                    stop: b3,
                },
            ) => a1 == b1 && a2 == b2 && a3 == b3,
            (Self::Matrix(a), Self::Matrix(b)) => a == b,
            (Self::Cell(a), Self::Cell(b)) => a == b,
            (Self::FnHandle(a), Self::FnHandle(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.is_same(b),
            (Self::Exception(a), Self::Exception(b)) => a == b,
            _ => false,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("[]"),
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
            Self::Range { start, step, stop } => {
                let mut first = true;
                for x in range_values(*start, *step, *stop) {
                    if !first {
                        f.write_str("  ")?;
                    }
                    write!(f, "{x}")?;
                    first = false;
                }
                Ok(())
            }
            Self::Matrix(m) => {
                for r in 0..m.rows {
                    if r > 0 {
                        f.write_char('\n')?;
                    }
                    for c in 0..m.cols {
                        if c > 0 {
                            f.write_str("  ")?;
                        }
                        write!(f, "{}", m.data[c * m.rows + r])?;
                    }
                }
                Ok(())
            }
            Self::Cell(c) => {
                f.write_char('{')?;
                for (i, v) in c.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_char('}')
            }
            Self::FnHandle(FnHandleValue::Named(name)) => write!(f, "@{name}"),
            Self::FnHandle(FnHandleValue::Anon(closure)) => {
                write!(f, "@({})", closure.params.join(", "))
            }
            Self::Object(obj) => f.write_str(&obj.display_tag()),
            Self::Exception(err) => write!(f, "{err}"),
        }
    }
}

fn range_len(start: f64, step: f64, stop: f64) -> usize {
    if step == 0.0 || (stop - start) / step < 0.0 {
        0
    } else {
        ((stop - start) / step).floor() as usize + 1
    }
}

fn range_values(start: f64, step: f64, stop: f64) -> impl Iterator<Item = f64> {
    (0..range_len(start, step, stop)).map(move |i| start + step * i as f64)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn range_numel_and_iteration() {
        let r = Value::Range {
            start: 1.0,
            step: 1.0,
            stop: 5.0,
        };
        assert_eq!(r.numel(), 5);
        let cols = r.iter_columns().unwrap();
        assert_eq!(cols.len(), 5);
        assert_eq!(cols[4], Value::Num(5.0));
    }

    #[test]
    fn descending_range_needs_negative_step() {
        let empty = Value::Range {
            start: 5.0,
            step: 1.0,
            stop: 1.0,
        };
        assert_eq!(empty.numel(), 0);
        let down = Value::Range {
            start: 5.0,
            step: -2.0,
            stop: 1.0,
        };
        assert_eq!(down.numel(), 3);
    }

    #[test]
    fn truthiness_of_scalars_and_strings() {
        assert!(Value::Int(3).is_truthy().unwrap());
        assert!(!Value::Num(0.0).is_truthy().unwrap());
        assert!(!Value::Empty.is_truthy().unwrap());
        assert!(Value::Str("yes".into()).is_truthy().unwrap());
        assert!(!Value::Str(String::new()).is_truthy().unwrap());
    }

    #[test]
    fn cells_reject_conditions() {
        let c = Value::Cell(Rc::new(vec![Value::Int(1)]));
        let err = c.is_truthy().unwrap_err();
        assert!(err.is(ErrorId::WrongType));
    }

    #[test]
    fn int_and_num_compare_numerically() {
        assert_eq!(Value::Int(2), Value::Num(2.0));
    }
}
