//! Computed offsets, lengths and counts.
//!
//! An [`Expr`] is evaluated against a [`Scope`]: an immutable snapshot of the
//! record decoded so far, the whole buffer and the current cursor.

use std::ops;

use crate::{errors::ExprError, value::Record};

/// What an expression can see while a field is being resolved.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub record: &'a Record,
    pub buffer: &'a [u8],
    pub cursor: usize,
}

/// Escape hatch for layouts the built-in operators cannot express.
pub type ExprFn = fn(&Scope<'_>) -> Result<usize, ExprError>;

#[derive(Debug, Clone)]
pub enum Expr {
    Const(usize),
    /// Unsigned value of an earlier field. `path` may be dotted to reach into
    /// nested records; `index` selects one element of a repeated field.
    Field { path: String, index: Option<usize> },
    /// Bytes between the cursor and the end of the buffer.
    Remaining,
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Fn(ExprFn),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Expr::Field {
            path: path.into(),
            index: None,
        }
    }

    pub fn element(path: impl Into<String>, index: usize) -> Self {
        Expr::Field {
            path: path.into(),
            index: Some(index),
        }
    }

    /// The literal value, if this expression does not depend on the input.
    pub fn as_const(&self) -> Option<usize> {
        match self {
            Expr::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the value may depend on the buffer or cursor rather than only
    /// on decoded fields. `Fn` is assumed to.
    pub fn reads_buffer(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Field { .. } => false,
            Expr::Remaining | Expr::Fn(_) => true,
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => {
                a.reads_buffer() || b.reads_buffer()
            }
        }
    }

    pub fn eval(&self, scope: &Scope<'_>) -> Result<usize, ExprError> {
        match self {
            Expr::Const(v) => Ok(*v),
            Expr::Field { path, index } => resolve_field(scope.record, path, *index),
            Expr::Remaining => Ok(scope.buffer.len().saturating_sub(scope.cursor)),
            Expr::Add(a, b) => a.eval(scope)?.checked_add(b.eval(scope)?).ok_or(ExprError::Arithmetic),
            Expr::Sub(a, b) => a.eval(scope)?.checked_sub(b.eval(scope)?).ok_or(ExprError::Arithmetic),
            Expr::Mul(a, b) => a.eval(scope)?.checked_mul(b.eval(scope)?).ok_or(ExprError::Arithmetic),
            Expr::Div(a, b) => a.eval(scope)?.checked_div(b.eval(scope)?).ok_or(ExprError::Arithmetic),
            Expr::Fn(f) => f(scope),
        }
    }
}

fn resolve_field(record: &Record, path: &str, index: Option<usize>) -> Result<usize, ExprError> {
    let value = record
        .lookup(path)
        .ok_or_else(|| ExprError::UnresolvedReference(path.to_string()))?;

    let value = match index {
        Some(i) => value
            .as_array()
            .and_then(|values| values.get(i))
            .ok_or_else(|| ExprError::UnresolvedReference(format!("{path}[{i}]")))?,
        None => value,
    };

    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| ExprError::NotAnInteger(path.to_string()))
}

impl From<usize> for Expr {
    fn from(value: usize) -> Self {
        Expr::Const(value)
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(Box::new(self), Box::new(rhs))
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Sub(Box::new(self), Box::new(rhs))
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(Box::new(self), Box::new(rhs))
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Div(Box::new(self), Box::new(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn scope<'a>(record: &'a Record, buffer: &'a [u8], cursor: usize) -> Scope<'a> {
        Scope {
            record,
            buffer,
            cursor,
        }
    }

    #[test]
    fn test_field_reference() {
        let record = Record::new().with("count", 3u64);
        let expr = Expr::field("count") * Expr::Const(4);
        assert_eq!(expr.eval(&scope(&record, &[], 0)), Ok(12));
    }

    #[test]
    fn test_element_reference() {
        let header = Record::new().with("phoff", Value::Array(vec![Value::UInt(64), Value::UInt(0)]));
        let record = Record::new().with("header", Value::Record(header));

        assert_eq!(Expr::element("header.phoff", 0).eval(&scope(&record, &[], 0)), Ok(64));
        assert_eq!(
            Expr::element("header.phoff", 2).eval(&scope(&record, &[], 0)),
            Err(ExprError::UnresolvedReference("header.phoff[2]".to_string()))
        );
    }

    #[test]
    fn test_remaining() {
        let record = Record::new();
        let buffer = [0u8; 10];
        assert_eq!(Expr::Remaining.eval(&scope(&record, &buffer, 4)), Ok(6));
        assert_eq!(Expr::Remaining.eval(&scope(&record, &buffer, 12)), Ok(0));
        assert_eq!((Expr::Remaining / Expr::Const(3)).eval(&scope(&record, &buffer, 1)), Ok(3));
    }

    #[test]
    fn test_errors() {
        let record = Record::new().with("magic", "cmpt");
        let s = scope(&record, &[], 0);

        assert_eq!(
            Expr::field("missing").eval(&s),
            Err(ExprError::UnresolvedReference("missing".to_string()))
        );
        assert_eq!(
            Expr::field("magic").eval(&s),
            Err(ExprError::NotAnInteger("magic".to_string()))
        );
        assert_eq!((Expr::Const(1) - Expr::Const(2)).eval(&s), Err(ExprError::Arithmetic));
        assert_eq!((Expr::Const(1) / Expr::Const(0)).eval(&s), Err(ExprError::Arithmetic));
    }

    #[test]
    fn test_reads_buffer() {
        assert!(!(Expr::field("n") * Expr::Const(4)).reads_buffer());
        assert!((Expr::Remaining - Expr::Const(4)).reads_buffer());
        assert!(!Expr::element("offsets", 1).reads_buffer());
    }

    #[test]
    fn test_fn() {
        fn half_remaining(scope: &Scope<'_>) -> Result<usize, ExprError> {
            Ok((scope.buffer.len() - scope.cursor) / 2)
        }

        let record = Record::new();
        assert_eq!(Expr::Fn(half_remaining).eval(&scope(&record, &[0; 8], 2)), Ok(3));
    }
}
