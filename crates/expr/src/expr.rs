// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Expression nodes
//!
//! The closed expression family of the query compiler. Nodes are
//! immutable after construction; every transformation builds new nodes
//! and shares unchanged subtrees freely. Source spans ride along on each
//! node but never participate in equality or hashing, so structurally
//! identical expressions compare equal regardless of where they were
//! parsed.
//!
//! ## Node kinds
//!
//! - [`ConstantExpr`] — a literal value with its type
//! - [`ParamExpr`] — a query argument `?n` (1-based)
//! - [`ColumnExpr`] — a column access, possibly a dotted subpath, or the
//!   projection wildcard
//! - [`VarExpr`] / [`AssignExpr`] — local bindings within a query scope
//! - [`ConversionExpr`] — a checked type conversion
//! - [`ProjExpr`] — a projected column with ordering/exclusion flags
//! - [`NotExpr`] — boolean negation that survived rewriting
//! - [`BinaryExpr`] — arithmetic, comparison and logical operators
//! - [`InExpr`] / [`RangeExpr`] — range membership
//! - [`CallExpr`] — a validated function call

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use relq_types::{escape_name, Column, Primitive, TupleType, Type, Value};

use crate::apply::{ApplierKind, FunctionApplier, FunctionFinder};
use crate::error::{ExprError, ExprResult};
use crate::span::Span;

/// The closed expression variant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Constant(ConstantExpr),
    Param(ParamExpr),
    Column(ColumnExpr),
    Var(VarExpr),
    Assign(Box<AssignExpr>),
    Conversion(Box<ConversionExpr>),
    Not(Box<NotExpr>),
    Binary(Box<BinaryExpr>),
    In(Box<InExpr>),
    Range(Box<RangeExpr>),
    Call(Box<CallExpr>),
}

/// A literal value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstantExpr {
    pub span: Span,
    pub value: Value,
    pub ty: Type,
}

impl ConstantExpr {
    pub fn new(span: Span, value: Value) -> Self {
        let ty = value.ty();
        Self { span, value, ty }
    }

    pub fn typed(span: Span, value: Value, ty: Type) -> Self {
        Self { span, value, ty }
    }

    /// The boolean constants, used by filter folding.
    pub fn bool_expr(span: Span, value: bool) -> Expr {
        Expr::Constant(ConstantExpr::new(span, Value::Boolean(value)))
    }
}

/// A query argument reference, 1-based
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamExpr {
    pub span: Span,
    pub ordinal: usize,
    pub ty: Type,
}

impl ParamExpr {
    pub fn new(span: Span, ordinal: usize) -> Self {
        Self {
            span,
            ordinal,
            ty: Type::Any,
        }
    }
}

/// A column access against a row type.
///
/// An empty path is the projection wildcard `*`, which must be expanded
/// before evaluation. A path longer than one segment descends into
/// tuple-typed columns; the first segment names the base column that a
/// scan must fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnExpr {
    pub span: Span,
    pub row_type: Arc<TupleType>,
    pub path: Vec<String>,
    /// Resolved leaf column; `None` for the wildcard
    pub column: Option<Column>,
}

impl ColumnExpr {
    /// Resolve a path against a row type.
    pub fn resolve(span: Span, row_type: Arc<TupleType>, path: Vec<String>) -> ExprResult<Self> {
        let joined = path.join(".");
        let column = row_type
            .try_find_column(&joined)
            .cloned()
            .ok_or_else(|| ExprError::UnresolvedName {
                name: joined,
                reason: None,
                span,
            })?;
        Ok(Self {
            span,
            row_type,
            path,
            column: Some(column),
        })
    }

    /// The projection wildcard.
    pub fn wildcard(span: Span, row_type: Arc<TupleType>) -> Self {
        Self {
            span,
            row_type,
            path: Vec::new(),
            column: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.column.is_none()
    }

    /// Name of the base column a scan must fetch.
    pub fn base_name(&self) -> Option<&str> {
        self.path.first().map(String::as_str)
    }

    /// The full dotted name as written in query text.
    pub fn printed_name(&self) -> String {
        self.path
            .iter()
            .map(|s| escape_name(s))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn ty(&self) -> Type {
        match &self.column {
            Some(col) => col.ty.clone(),
            None => Type::Any,
        }
    }
}

/// A reference to a previously assigned local
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarExpr {
    pub span: Span,
    pub name: String,
    pub ty: Type,
}

/// A named local binding; later references resolve to [`VarExpr`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssignExpr {
    pub span: Span,
    pub name: String,
    pub expr: Expr,
}

impl AssignExpr {
    /// The variable reference this assignment introduces.
    pub fn var(&self) -> VarExpr {
        VarExpr {
            span: self.span,
            name: self.name.clone(),
            ty: self.expr.ty(),
        }
    }
}

/// A checked conversion to a target type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversionExpr {
    pub span: Span,
    pub expr: Expr,
    pub ty: Type,
}

/// Projection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProjFlags(u8);

impl ProjFlags {
    pub const ORDER_BY: ProjFlags = ProjFlags(1);
    pub const DESCENDING: ProjFlags = ProjFlags(2);
    pub const NULL_LOW: ProjFlags = ProjFlags(4);
    pub const EXCLUDE: ProjFlags = ProjFlags(8);

    pub fn contains(self, other: ProjFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: ProjFlags) -> ProjFlags {
        ProjFlags(self.0 | other.0)
    }

    pub fn without(self, other: ProjFlags) -> ProjFlags {
        ProjFlags(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// A projected column or derived expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjExpr {
    pub span: Span,
    /// Output column name
    pub name: String,
    pub flags: ProjFlags,
    pub expr: Expr,
}

impl ProjExpr {
    /// Validate the flag invariants: `NULL_LOW` requires `ORDER_BY`.
    pub fn make(span: Span, name: String, flags: ProjFlags, expr: Expr) -> ExprResult<Self> {
        if flags.contains(ProjFlags::NULL_LOW) && !flags.contains(ProjFlags::ORDER_BY) {
            return Err(ExprError::InvalidProjection {
                message: format!("null-low flag on {name} requires an ordering flag"),
                span,
            });
        }
        Ok(Self {
            span,
            name,
            flags,
            expr,
        })
    }

    pub fn is_order_by(&self) -> bool {
        self.flags.contains(ProjFlags::ORDER_BY)
    }

    pub fn is_excluded(&self) -> bool {
        self.flags.contains(ProjFlags::EXCLUDE)
    }

    /// The output column this projection produces.
    pub fn output_column(&self) -> Column {
        Column::new(self.name.clone(), self.expr.ty()).with_hidden(false)
    }
}

/// Boolean negation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotExpr {
    pub span: Span,
    pub expr: Expr,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Short-circuit or
    Or,
    /// Short-circuit and
    And,
    /// Eager boolean / bitwise or
    BitOr,
    /// Boolean / bitwise xor
    Xor,
    /// Eager boolean / bitwise and
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(
            self,
            BinaryOp::Or | BinaryOp::And | BinaryOp::BitOr | BinaryOp::Xor | BinaryOp::BitAnd
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    pub fn is_short_circuit(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// The negated comparison, e.g. `<` becomes `>=`.
    pub fn negate_comparison(self) -> Option<BinaryOp> {
        Some(match self {
            BinaryOp::Eq => BinaryOp::Ne,
            BinaryOp::Ne => BinaryOp::Eq,
            BinaryOp::Lt => BinaryOp::Ge,
            BinaryOp::Ge => BinaryOp::Lt,
            BinaryOp::Gt => BinaryOp::Le,
            BinaryOp::Le => BinaryOp::Gt,
            _ => return None,
        })
    }

    /// The mirrored comparison, e.g. `a < b` is `b > a`.
    pub fn flip(self) -> BinaryOp {
        match self {
            BinaryOp::Lt => BinaryOp::Gt,
            BinaryOp::Le => BinaryOp::Ge,
            BinaryOp::Gt => BinaryOp::Lt,
            BinaryOp::Ge => BinaryOp::Le,
            other => other,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::BitOr => "|",
            BinaryOp::Xor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

/// A binary operation whose operands share the node's common type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinaryExpr {
    pub span: Span,
    pub op: BinaryOp,
    pub left: Expr,
    pub right: Expr,
    pub ty: Type,
}

/// Range membership: `value in range`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InExpr {
    pub span: Span,
    pub value: Expr,
    pub range: Expr,
    pub ty: Type,
}

impl InExpr {
    pub fn make(span: Span, value: Expr, range: Expr) -> ExprResult<Expr> {
        let elem = match range.ty() {
            Type::Range(elem) => *elem,
            other => {
                return Err(ExprError::TypeMismatch {
                    message: format!("in requires a range operand, found {other}"),
                    span: range.span(),
                });
            }
        };
        let value = match value.ty().common_type(&elem, relq_types::OpCategory::Comparison) {
            Some(common) => value.as_type(&common)?,
            None => {
                return Err(ExprError::TypeMismatch {
                    message: format!("cannot compare {} with range over {elem}", value.ty()),
                    span,
                });
            }
        };
        let ty = if value.is_nullable() {
            Type::BOOLEAN.nullable()
        } else {
            Type::BOOLEAN
        };
        Ok(Expr::In(Box::new(InExpr {
            span,
            value,
            range,
            ty,
        })))
    }
}

/// A range constructor: `start .. end`, either endpoint open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeExpr {
    pub span: Span,
    pub start: Option<Expr>,
    pub end: Option<Expr>,
    pub ty: Type,
}

impl RangeExpr {
    pub fn make(span: Span, start: Option<Expr>, end: Option<Expr>) -> ExprResult<Expr> {
        let elem = match (&start, &end) {
            (Some(s), Some(e)) => s
                .ty()
                .common_type(&e.ty(), relq_types::OpCategory::Comparison)
                .ok_or_else(|| ExprError::TypeMismatch {
                    message: format!("range endpoints {} and {} do not unify", s.ty(), e.ty()),
                    span,
                })?,
            (Some(s), None) => s.ty(),
            (None, Some(e)) => e.ty(),
            (None, None) => Type::basic(Primitive::Long),
        };
        let start = start.map(|s| s.as_type(&elem)).transpose()?;
        let end = end.map(|e| e.as_type(&elem)).transpose()?;
        Ok(Expr::Range(Box::new(RangeExpr {
            span,
            start,
            end,
            ty: Type::Range(Box::new(elem)),
        })))
    }

    /// True when both endpoints are constants that enclose zero, i.e.
    /// the range covers the current row of a window frame.
    pub fn has_current(&self) -> bool {
        let zero = Value::Long(0);
        let start_ok = match &self.start {
            None => true,
            Some(Expr::Constant(c)) => matches!(
                c.value.compare(&zero),
                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
            ),
            Some(_) => false,
        };
        let end_ok = match &self.end {
            None => true,
            Some(Expr::Constant(c)) => matches!(
                c.value.compare(&zero),
                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
            ),
            Some(_) => false,
        };
        start_ok && end_ok
    }
}

/// A validated function call.
///
/// Equality and hashing cover the name and arguments; the applier is
/// derived state (the registry resolves structurally identical calls to
/// the same applier).
#[derive(Debug, Clone)]
pub struct CallExpr {
    pub span: Span,
    pub name: String,
    pub args: Vec<Expr>,
    pub named_args: Vec<(String, Expr)>,
    pub applier: Arc<dyn FunctionApplier>,
}

impl CallExpr {
    /// Resolve and validate a call. Rejects aggregates whose arguments
    /// already accumulate: an aggregate may not depend on an
    /// accumulating sub-expression.
    pub fn make(
        span: Span,
        name: String,
        args: Vec<Expr>,
        named_args: Vec<(String, Expr)>,
        finder: &dyn FunctionFinder,
    ) -> ExprResult<Expr> {
        let mut reason = None;
        let applier = finder
            .try_find(&name, &args, &named_args, &mut reason)
            .ok_or_else(|| ExprError::UnresolvedName {
                name: name.clone(),
                reason,
                span,
            })?;
        if applier.kind() != ApplierKind::Plain {
            for arg in args.iter().chain(named_args.iter().map(|(_, e)| e)) {
                if arg.is_accumulating() {
                    return Err(ExprError::AggregationMisuse {
                        message: format!(
                            "{name} cannot be applied to an accumulating expression"
                        ),
                        span: arg.span(),
                    });
                }
            }
        }
        Ok(Expr::Call(Box::new(CallExpr {
            span,
            name,
            args,
            named_args,
            applier,
        })))
    }

    /// Purity of the call: the function and all of its arguments.
    pub fn is_pure_function(&self) -> bool {
        self.applier.is_pure()
            && self.args.iter().all(Expr::is_pure)
            && self.named_args.iter().all(|(_, e)| e.is_pure())
    }
}

impl PartialEq for CallExpr {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.args == other.args
            && self.named_args == other.named_args
            && self.applier.kind() == other.applier.kind()
    }
}

impl Eq for CallExpr {}

impl Hash for CallExpr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.args.hash(state);
        self.named_args.hash(state);
    }
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Constant(e) => e.span,
            Expr::Param(e) => e.span,
            Expr::Column(e) => e.span,
            Expr::Var(e) => e.span,
            Expr::Assign(e) => e.span,
            Expr::Conversion(e) => e.span,
            Expr::Not(e) => e.span,
            Expr::Binary(e) => e.span,
            Expr::In(e) => e.span,
            Expr::Range(e) => e.span,
            Expr::Call(e) => e.span,
        }
    }

    /// The total type of this expression.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Constant(e) => e.ty.clone(),
            Expr::Param(e) => e.ty.clone(),
            Expr::Column(e) => e.ty(),
            Expr::Var(e) => e.ty.clone(),
            Expr::Assign(e) => e.expr.ty(),
            Expr::Conversion(e) => e.ty.clone(),
            Expr::Not(e) => e.expr.ty(),
            Expr::Binary(e) => e.ty.clone(),
            Expr::In(e) => e.ty.clone(),
            Expr::Range(e) => e.ty.clone(),
            Expr::Call(e) => e.applier.result_type(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.ty().is_nullable()
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Expr::Constant(c) if c.value.is_null())
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Constant(c) if c.value.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Constant(c) if c.value.is_one())
    }

    /// True for a range whose constant endpoints enclose the current
    /// row (position zero) of a window frame.
    pub fn is_range_with_current(&self) -> bool {
        matches!(self, Expr::Range(r) if r.has_current())
    }

    /// The constant boolean `true`.
    pub fn is_const_true(&self) -> bool {
        matches!(self, Expr::Constant(c) if c.value == Value::Boolean(true))
    }

    /// The constant boolean `false`.
    pub fn is_const_false(&self) -> bool {
        matches!(self, Expr::Constant(c) if c.value == Value::Boolean(false))
    }

    /// Highest parameter ordinal referenced in this subtree; zero when
    /// no parameter occurs.
    pub fn max_argument(&self) -> usize {
        let mut max = 0;
        self.visit(&mut |e| {
            if let Expr::Param(p) = e {
                max = max.max(p.ordinal);
            }
        });
        max
    }

    /// Pure expressions are deterministic and side-effect free.
    pub fn is_pure(&self) -> bool {
        match self {
            Expr::Constant(_) | Expr::Param(_) | Expr::Column(_) | Expr::Var(_) => true,
            Expr::Assign(e) => e.expr.is_pure(),
            Expr::Conversion(e) => e.expr.is_pure(),
            Expr::Not(e) => e.expr.is_pure(),
            Expr::Binary(e) => e.left.is_pure() && e.right.is_pure(),
            Expr::In(e) => e.value.is_pure() && e.range.is_pure(),
            Expr::Range(e) => {
                e.start.as_ref().is_none_or(Expr::is_pure)
                    && e.end.as_ref().is_none_or(Expr::is_pure)
            }
            Expr::Call(e) => e.is_pure_function(),
        }
    }

    /// True when evaluating this subtree can raise a runtime error.
    /// Fixed-width integer arithmetic and narrowing conversions can;
    /// comparisons and float arithmetic cannot.
    pub fn can_throw(&self) -> bool {
        match self {
            Expr::Constant(_) | Expr::Param(_) | Expr::Column(_) | Expr::Var(_) => false,
            Expr::Assign(e) => e.expr.can_throw(),
            Expr::Conversion(e) => {
                // Widening to the big lanes never fails; everything else
                // is checked at runtime.
                !matches!(
                    e.ty.primitive(),
                    Some(Primitive::BigInteger | Primitive::BigDecimal)
                ) || e.expr.can_throw()
            }
            Expr::Not(e) => e.expr.can_throw(),
            Expr::Binary(e) => {
                let lanes_throw = e.op.is_arithmetic()
                    && e.ty.is_integer()
                    && e.ty.primitive() != Some(Primitive::BigInteger);
                lanes_throw || e.left.can_throw() || e.right.can_throw()
            }
            Expr::In(e) => e.value.can_throw() || e.range.can_throw(),
            Expr::Range(e) => {
                e.start.as_ref().is_some_and(Expr::can_throw)
                    || e.end.as_ref().is_some_and(Expr::can_throw)
            }
            Expr::Call(e) => {
                !e.applier.never_throws()
                    || e.args.iter().any(Expr::can_throw)
                    || e.named_args.iter().any(|(_, a)| a.can_throw())
            }
        }
    }

    /// Visit every node of the subtree, parents before children.
    pub fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Constant(_) | Expr::Param(_) | Expr::Column(_) | Expr::Var(_) => {}
            Expr::Assign(e) => e.expr.visit(f),
            Expr::Conversion(e) => e.expr.visit(f),
            Expr::Not(e) => e.expr.visit(f),
            Expr::Binary(e) => {
                e.left.visit(f);
                e.right.visit(f);
            }
            Expr::In(e) => {
                e.value.visit(f);
                e.range.visit(f);
            }
            Expr::Range(e) => {
                if let Some(s) = &e.start {
                    s.visit(f);
                }
                if let Some(s) = &e.end {
                    s.visit(f);
                }
            }
            Expr::Call(e) => {
                for a in &e.args {
                    a.visit(f);
                }
                for (_, a) in &e.named_args {
                    a.visit(f);
                }
            }
        }
    }

    /// Collect the base columns this subtree reads from its source row.
    pub fn gather_eval_columns(&self, consumer: &mut dyn FnMut(&ColumnExpr)) {
        self.visit(&mut |e| {
            if let Expr::Column(c) = e {
                consumer(c);
            }
        });
    }

    /// Subtree consumes multiple rows — an aggregated or grouped call —
    /// and therefore requires group context. The distinction the source
    /// draws between needing group context and accumulating collapses
    /// here: every accumulating node needs the context and vice versa.
    pub fn is_accumulating(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::Call(c) = e {
                if c.applier.kind() != ApplierKind::Plain {
                    found = true;
                }
            }
        });
        found
    }

    /// Subtree produces one value per group: an aggregated call.
    pub fn is_aggregating(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::Call(c) = e {
                if c.applier.kind() == ApplierKind::Aggregated {
                    found = true;
                }
            }
        });
        found
    }

    /// Subtree contains a grouped (window) call.
    pub fn has_window_call(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if let Expr::Call(c) = e {
                if c.applier.kind() == ApplierKind::Grouped {
                    found = true;
                }
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("id", Type::basic(Primitive::Long)),
            Column::new("salary", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    fn col(name: &str) -> Expr {
        Expr::Column(
            ColumnExpr::resolve(Span::default(), row_type(), vec![name.to_string()]).unwrap(),
        )
    }

    #[test]
    fn test_equality_ignores_spans() {
        let a = Expr::Constant(ConstantExpr::new(Span::new(0, 1), Value::Int(5)));
        let b = Expr::Constant(ConstantExpr::new(Span::new(9, 10), Value::Int(5)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_column_resolution() {
        let c = col("salary");
        assert!(c.ty().is_nullable());
        let err =
            ColumnExpr::resolve(Span::default(), row_type(), vec!["missing".into()]).unwrap_err();
        assert!(matches!(err, ExprError::UnresolvedName { .. }));
    }

    #[test]
    fn test_max_argument() {
        let p1 = Expr::Param(ParamExpr::new(Span::default(), 1));
        let p3 = Expr::Param(ParamExpr::new(Span::default(), 3));
        let e = Expr::Binary(Box::new(BinaryExpr {
            span: Span::default(),
            op: BinaryOp::Add,
            left: p1,
            right: p3,
            ty: Type::Any,
        }));
        assert_eq!(e.max_argument(), 3);
        assert_eq!(col("id").max_argument(), 0);
    }

    #[test]
    fn test_proj_flags() {
        let f = ProjFlags::ORDER_BY.with(ProjFlags::DESCENDING);
        assert!(f.contains(ProjFlags::ORDER_BY));
        assert!(!f.contains(ProjFlags::EXCLUDE));
        assert!(f.without(ProjFlags::DESCENDING) == ProjFlags::ORDER_BY);
    }

    #[test]
    fn test_null_low_requires_order_by() {
        let err = ProjExpr::make(
            Span::default(),
            "x".into(),
            ProjFlags::NULL_LOW,
            col("id"),
        )
        .unwrap_err();
        assert!(matches!(err, ExprError::InvalidProjection { .. }));
    }

    #[test]
    fn test_range_with_current() {
        let range = RangeExpr::make(
            Span::default(),
            Some(Expr::Constant(ConstantExpr::new(
                Span::default(),
                Value::Long(-1),
            ))),
            Some(Expr::Constant(ConstantExpr::new(
                Span::default(),
                Value::Long(1),
            ))),
        )
        .unwrap();
        assert!(range.is_range_with_current());

        let ahead = RangeExpr::make(
            Span::default(),
            Some(Expr::Constant(ConstantExpr::new(
                Span::default(),
                Value::Long(1),
            ))),
            Some(Expr::Constant(ConstantExpr::new(
                Span::default(),
                Value::Long(2),
            ))),
        )
        .unwrap();
        assert!(!ahead.is_range_with_current());
    }
}
