// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The query parser
//!
//! Hand-written recursive descent over the token stream:
//!
//! ```text
//! Query       = [ "{" ProjExprs "}" ] [ Expr ]
//! ProjExprs   = ProjExpr { "," ProjExpr }
//! ProjExpr    = "*" | [ProjOp] Ident ["=" Expr]
//! ProjOp      = [ "~" ] [ ("+"|"-") [ "!" ] ]
//! Expr        = LogicalOr, with C-like precedence down to:
//! Entity      = "(" Expr ")" | Literal | "?" [UInt] | Path ["(" Args ")"]
//! Path        = Ident { "." Ident }
//! ```
//!
//! Column paths resolve against the row type, call names through the
//! function finder, and projection assignments introduce locals that
//! later references resolve to. Bare `?` parameters number themselves
//! one past the highest ordinal seen so far.

use std::collections::HashMap;
use std::sync::Arc;

use relq_expr::{
    AssignExpr, BinaryExpr, BinaryOp, CallExpr, ColumnExpr, ConstantExpr, Expr, InExpr, ParamExpr,
    ProjExpr, ProjFlags, RangeExpr, Span, VarExpr,
};
use relq_expr::{ExprError, FunctionFinder};
use relq_types::{TupleType, Type};

use crate::error::{ParseError, ParseResult};
use crate::token::{tokenize, Tok, Token};

/// A parsed query, before planning
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedQuery {
    /// `None` means no projection block: all columns
    pub projection: Option<Vec<ProjExpr>>,
    pub filter: Option<Expr>,
}

impl std::fmt::Display for ParsedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(projection) = &self.projection {
            f.write_str("{")?;
            for (i, proj) in projection.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{proj}")?;
            }
            f.write_str("}")?;
            if self.filter.is_some() {
                f.write_str(" ")?;
            }
        }
        if let Some(filter) = &self.filter {
            write!(f, "{filter}")?;
        }
        Ok(())
    }
}

/// Parse a query against a row type.
pub fn parse_query(
    row_type: Arc<TupleType>,
    finder: &dyn FunctionFinder,
    source: &str,
) -> ParseResult<ParsedQuery> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
        row_type,
        finder,
        max_param: 0,
        locals: HashMap::new(),
    };
    parser.query()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
    row_type: Arc<TupleType>,
    finder: &'a dyn FunctionFinder,
    /// Highest parameter ordinal seen; bare `?` takes the next one
    max_param: u64,
    /// Projection assignments visible to later expressions
    locals: HashMap<String, Type>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn peek2(&self) -> Option<&Tok> {
        self.tokens.get(self.pos + 1).map(|t| &t.tok)
    }

    fn span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> ParseResult<Span> {
        let span = self.span();
        if self.eat(&tok) {
            Ok(span)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, what: &str) -> ParseError {
        let found = match self.peek() {
            Some(tok) => format!("{tok:?}"),
            None => "end of query".into(),
        };
        ParseError::Syntax {
            message: format!("expected {what}, found {found}"),
            span: self.span(),
        }
    }

    fn query(&mut self) -> ParseResult<ParsedQuery> {
        let projection = if self.eat(&Tok::LBrace) {
            let mut projections = Vec::new();
            loop {
                projections.push(self.proj_expr()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RBrace, "}")?;
            // Projection names must be unique.
            let mut seen = std::collections::HashSet::new();
            for proj in &projections {
                if !seen.insert(proj.name.clone()) {
                    return Err(ExprError::DuplicateBinding {
                        name: proj.name.clone(),
                        span: proj.span,
                    }
                    .into());
                }
            }
            Some(projections)
        } else {
            None
        };
        let filter = if self.peek().is_some() {
            Some(self.expr()?)
        } else {
            None
        };
        if let Some(token) = self.next() {
            return Err(ParseError::Syntax {
                message: format!("unexpected trailing {:?}", token.tok),
                span: token.span,
            });
        }
        Ok(ParsedQuery { projection, filter })
    }

    fn proj_expr(&mut self) -> ParseResult<ProjExpr> {
        let start = self.span();
        if self.eat(&Tok::Star) {
            let expr = Expr::Column(ColumnExpr::wildcard(start, Arc::clone(&self.row_type)));
            return Ok(ProjExpr::make(start, "*".into(), ProjFlags::default(), expr)?);
        }
        let mut flags = ProjFlags::default();
        if self.eat(&Tok::Tilde) {
            flags = flags.with(ProjFlags::EXCLUDE);
        }
        if self.eat(&Tok::Plus) {
            flags = flags.with(ProjFlags::ORDER_BY);
        } else if self.eat(&Tok::Minus) {
            flags = flags.with(ProjFlags::ORDER_BY).with(ProjFlags::DESCENDING);
        }
        if flags.contains(ProjFlags::ORDER_BY) && self.eat(&Tok::Bang) {
            flags = flags.with(ProjFlags::NULL_LOW);
        }

        let (name, name_span) = self.ident("projection name")?;
        if self.eat(&Tok::Assign) {
            let expr = self.expr()?;
            if self.row_type.try_column_for(&name).is_some() || self.locals.contains_key(&name) {
                return Err(ExprError::DuplicateBinding {
                    name,
                    span: name_span,
                }
                .into());
            }
            self.locals.insert(name.clone(), expr.ty());
            let span = name_span.cover(expr.span());
            let assign = Expr::Assign(Box::new(AssignExpr {
                span,
                name: name.clone(),
                expr,
            }));
            return Ok(ProjExpr::make(span, name, flags, assign)?);
        }

        // A plain (possibly dotted) column projection.
        let mut path = vec![name];
        while self.eat(&Tok::Dot) {
            path.push(self.ident("column path segment")?.0);
        }
        let span = name_span.cover(self.prev_span());
        let column = ColumnExpr::resolve(span, Arc::clone(&self.row_type), path)?;
        let name = column.printed_name();
        Ok(ProjExpr::make(span, name, flags, Expr::Column(column))?)
    }

    fn ident(&mut self, what: &str) -> ParseResult<(String, Span)> {
        match self.next() {
            Some(Token {
                tok: Tok::Ident(name) | Tok::QuotedIdent(name),
                span,
            }) => Ok((name, span)),
            Some(token) => Err(ParseError::Syntax {
                message: format!("expected {what}, found {:?}", token.tok),
                span: token.span,
            }),
            None => Err(ParseError::Syntax {
                message: format!("expected {what}, found end of query"),
                span: Span::new(self.end, self.end),
            }),
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens
            .get(self.pos.saturating_sub(1))
            .map(|t| t.span)
            .unwrap_or(Span::new(self.end, self.end))
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.logical_or()
    }

    fn binary_chain(
        &mut self,
        ops: &[(Tok, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut left = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.eat(tok) {
                    let right = next(self)?;
                    let span = left.span().cover(right.span());
                    left = BinaryExpr::make(span, *op, left, right)?;
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn logical_or(&mut self) -> ParseResult<Expr> {
        self.binary_chain(&[(Tok::OrOr, BinaryOp::Or)], Self::logical_and)
    }

    fn logical_and(&mut self) -> ParseResult<Expr> {
        self.binary_chain(&[(Tok::AndAnd, BinaryOp::And)], Self::bit_or)
    }

    fn bit_or(&mut self) -> ParseResult<Expr> {
        self.binary_chain(&[(Tok::Pipe, BinaryOp::BitOr)], Self::bit_xor)
    }

    fn bit_xor(&mut self) -> ParseResult<Expr> {
        self.binary_chain(&[(Tok::Caret, BinaryOp::Xor)], Self::bit_and)
    }

    fn bit_and(&mut self) -> ParseResult<Expr> {
        self.binary_chain(&[(Tok::Amp, BinaryOp::BitAnd)], Self::equality)
    }

    fn equality(&mut self) -> ParseResult<Expr> {
        self.binary_chain(
            &[(Tok::EqEq, BinaryOp::Eq), (Tok::NotEq, BinaryOp::Ne)],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.in_level()?;
        loop {
            let op = if self.eat(&Tok::Le) {
                BinaryOp::Le
            } else if self.eat(&Tok::Lt) {
                BinaryOp::Lt
            } else if self.eat(&Tok::Ge) {
                BinaryOp::Ge
            } else if self.eat(&Tok::Gt) {
                BinaryOp::Gt
            } else {
                return Ok(left);
            };
            let right = self.in_level()?;
            let span = left.span().cover(right.span());
            left = BinaryExpr::make(span, op, left, right)?;
        }
    }

    fn in_level(&mut self) -> ParseResult<Expr> {
        let left = self.range_level()?;
        if matches!(self.peek(), Some(Tok::Ident(kw)) if kw == "in") {
            self.pos += 1;
            let range = self.range_level()?;
            let span = left.span().cover(range.span());
            return Ok(InExpr::make(span, left, range)?);
        }
        Ok(left)
    }

    fn range_level(&mut self) -> ParseResult<Expr> {
        let start_span = self.span();
        if self.eat(&Tok::DotDot) {
            // Open-start range.
            let end = self.range_end()?;
            let span = match &end {
                Some(e) => start_span.cover(e.span()),
                None => start_span,
            };
            return Ok(RangeExpr::make(span, None, end)?);
        }
        let left = self.additive()?;
        if self.eat(&Tok::DotDot) {
            let end = self.range_end()?;
            let span = match &end {
                Some(e) => left.span().cover(e.span()),
                None => left.span().cover(self.prev_span()),
            };
            return Ok(RangeExpr::make(span, Some(left), end)?);
        }
        Ok(left)
    }

    /// An open range end stops at any token that cannot start an
    /// expression operand.
    fn range_end(&mut self) -> ParseResult<Option<Expr>> {
        let starts_operand = matches!(
            self.peek(),
            Some(
                Tok::Ident(_)
                    | Tok::QuotedIdent(_)
                    | Tok::Literal(_)
                    | Tok::Param(_)
                    | Tok::LParen
                    | Tok::Minus
                    | Tok::Plus
                    | Tok::Bang
            )
        );
        if starts_operand {
            Ok(Some(self.additive()?))
        } else {
            Ok(None)
        }
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        self.binary_chain(
            &[(Tok::Plus, BinaryOp::Add), (Tok::Minus, BinaryOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        self.binary_chain(
            &[
                (Tok::Star, BinaryOp::Mul),
                (Tok::Slash, BinaryOp::Div),
                (Tok::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        if self.eat(&Tok::Bang) {
            let operand = self.unary()?;
            let ty = operand.ty();
            if !ty.is_boolean() && !matches!(ty, Type::Any) {
                return Err(ExprError::TypeMismatch {
                    message: format!("! requires a boolean operand, found {ty}"),
                    span: operand.span(),
                }
                .into());
            }
            return Ok(operand.not());
        }
        if self.eat(&Tok::Minus) {
            let operand = self.unary()?;
            if let Some(negated) = operand.negate(true) {
                return Ok(negated);
            }
            let zero = Expr::Constant(ConstantExpr::new(span, relq_types::Value::Int(0)));
            let cover = span.cover(operand.span());
            return Ok(BinaryExpr::make(cover, BinaryOp::Sub, zero, operand)?);
        }
        if self.eat(&Tok::Plus) {
            return self.unary();
        }
        self.entity()
    }

    fn entity(&mut self) -> ParseResult<Expr> {
        let span = self.span();
        match self.peek() {
            Some(Tok::LParen) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(Tok::RParen, ")")?;
                Ok(inner)
            }
            Some(Tok::Literal(_)) => {
                let Some(Token {
                    tok: Tok::Literal(value),
                    span,
                }) = self.next()
                else {
                    unreachable!("peeked literal");
                };
                let mut constant = ConstantExpr::new(span, value);
                if constant.value.is_null() {
                    constant.ty = Type::Any;
                }
                Ok(Expr::Constant(constant))
            }
            Some(Tok::Param(_)) => {
                let Some(Token {
                    tok: Tok::Param(explicit),
                    span,
                }) = self.next()
                else {
                    unreachable!("peeked param");
                };
                let ordinal = match explicit {
                    Some(n) => {
                        if n == 0 || n > 100 {
                            return Err(ParseError::ParameterBounds { ordinal: n, span });
                        }
                        n
                    }
                    None => self.max_param + 1,
                };
                self.max_param = self.max_param.max(ordinal);
                Ok(Expr::Param(ParamExpr::new(span, ordinal as usize)))
            }
            Some(Tok::Ident(_) | Tok::QuotedIdent(_)) => self.path_entity(),
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn path_entity(&mut self) -> ParseResult<Expr> {
        let (first, first_span) = self.ident("identifier")?;

        // Keyword literals.
        if let Tok::Ident(_) = self.tokens[self.pos - 1].tok {
            match first.as_str() {
                "true" => {
                    return Ok(ConstantExpr::bool_expr(first_span, true));
                }
                "false" => {
                    return Ok(ConstantExpr::bool_expr(first_span, false));
                }
                "null" => {
                    let mut constant =
                        ConstantExpr::new(first_span, relq_types::Value::Null);
                    constant.ty = Type::Any;
                    return Ok(Expr::Constant(constant));
                }
                _ => {}
            }
        }

        // Call?
        if self.peek() == Some(&Tok::LParen) {
            self.pos += 1;
            let (args, named_args) = self.call_args()?;
            let span = first_span.cover(self.prev_span());
            return Ok(CallExpr::make(span, first, args, named_args, self.finder)?);
        }

        // Local binding?
        if self.peek() != Some(&Tok::Dot) {
            if let Some(ty) = self.locals.get(&first) {
                return Ok(Expr::Var(VarExpr {
                    span: first_span,
                    name: first,
                    ty: ty.clone(),
                }));
            }
        }

        // Column path.
        let mut path = vec![first];
        while self.eat(&Tok::Dot) {
            path.push(self.ident("column path segment")?.0);
        }
        let span = first_span.cover(self.prev_span());
        let column = ColumnExpr::resolve(span, Arc::clone(&self.row_type), path)?;
        Ok(Expr::Column(column))
    }

    fn call_args(&mut self) -> ParseResult<(Vec<Expr>, Vec<(String, Expr)>)> {
        let mut args = Vec::new();
        let mut named_args: Vec<(String, Expr)> = Vec::new();
        if self.eat(&Tok::RParen) {
            return Ok((args, named_args));
        }
        loop {
            // `name: expr` is a named argument.
            let named = matches!(self.peek(), Some(Tok::Ident(_) | Tok::QuotedIdent(_)))
                && self.peek2() == Some(&Tok::Colon);
            if named {
                let (name, name_span) = self.ident("argument name")?;
                self.expect(Tok::Colon, ":")?;
                if named_args.iter().any(|(n, _)| n == &name) {
                    return Err(ExprError::DuplicateBinding {
                        name,
                        span: name_span,
                    }
                    .into());
                }
                let value = self.expr()?;
                named_args.push((name, value));
            } else {
                if !named_args.is_empty() {
                    return Err(ParseError::Syntax {
                        message: "positional argument after named argument".into(),
                        span: self.span(),
                    });
                }
                args.push(self.expr()?);
            }
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RParen, ")")?;
        Ok((args, named_args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_types::{Column, Primitive, Value};

    struct NoFunctions;

    impl FunctionFinder for NoFunctions {
        fn try_find(
            &self,
            _name: &str,
            _args: &[Expr],
            _named: &[(String, Expr)],
            reason: &mut Option<String>,
        ) -> Option<std::sync::Arc<dyn relq_expr::FunctionApplier>> {
            *reason = Some("no functions in this test".into());
            None
        }
    }

    fn row_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("id", Type::basic(Primitive::Long)),
            Column::new("name", Type::basic(Primitive::Text)),
            Column::new("salary", Type::basic_nullable(Primitive::Double)),
            Column::new("active", Type::basic(Primitive::Boolean)),
        ])
        .unwrap()
    }

    fn parse(source: &str) -> ParsedQuery {
        parse_query(row_type(), &NoFunctions, source).unwrap()
    }

    #[test]
    fn test_projection_only() {
        let q = parse("{id, name}");
        let projection = q.projection.unwrap();
        assert_eq!(projection.len(), 2);
        assert_eq!(projection[0].name, "id");
        assert!(q.filter.is_none());
    }

    #[test]
    fn test_projection_flags() {
        let q = parse("{~id, +name, -!salary}");
        let p = q.projection.unwrap();
        assert!(p[0].flags.contains(ProjFlags::EXCLUDE));
        assert!(p[1].flags.contains(ProjFlags::ORDER_BY));
        assert!(p[2].flags.contains(ProjFlags::DESCENDING));
        assert!(p[2].flags.contains(ProjFlags::NULL_LOW));
    }

    #[test]
    fn test_filter_precedence() {
        let q = parse("id > ?1 && salary <= ?2 || active");
        let filter = q.filter.unwrap();
        // Or at the top.
        assert!(matches!(&filter, Expr::Binary(b) if b.op == BinaryOp::Or));
    }

    #[test]
    fn test_auto_numbering() {
        let q = parse("id > ? && id < ?");
        let filter = q.filter.unwrap();
        assert_eq!(filter.max_argument(), 2);
    }

    #[test]
    fn test_explicit_param_bounds() {
        let err = parse_query(row_type(), &NoFunctions, "id > ?0").unwrap_err();
        assert!(matches!(err, ParseError::ParameterBounds { ordinal: 0, .. }));
        let err = parse_query(row_type(), &NoFunctions, "id > ?101").unwrap_err();
        assert!(matches!(
            err,
            ParseError::ParameterBounds { ordinal: 101, .. }
        ));
    }

    #[test]
    fn test_in_range() {
        let q = parse("id in 1..10");
        assert!(matches!(q.filter.unwrap(), Expr::In(_)));
        let q = parse("id in ..10");
        assert!(matches!(q.filter.unwrap(), Expr::In(_)));
    }

    #[test]
    fn test_assignment_and_reference() {
        let q = parse("{id, double = salary, capped = double}");
        let p = q.projection.unwrap();
        assert!(matches!(&p[1].expr, Expr::Assign(_)));
        match &p[2].expr {
            Expr::Assign(a) => assert!(matches!(&a.expr, Expr::Var(v) if v.name == "double")),
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_binding() {
        let err = parse_query(row_type(), &NoFunctions, "{id, id}").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expr(ExprError::DuplicateBinding { .. })
        ));
        // Assignment may not shadow a column.
        let err = parse_query(row_type(), &NoFunctions, "{name = id}").unwrap_err();
        assert!(matches!(
            err,
            ParseError::Expr(ExprError::DuplicateBinding { .. })
        ));
    }

    #[test]
    fn test_unresolved_column() {
        let err = parse_query(row_type(), &NoFunctions, "missing == 1").unwrap_err();
        match err {
            ParseError::Expr(ExprError::UnresolvedName { name, .. }) => {
                assert_eq!(name, "missing");
            }
            other => panic!("expected unresolved name, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_function_reason() {
        let err = parse_query(row_type(), &NoFunctions, "woof(id)").unwrap_err();
        match err {
            ParseError::Expr(ExprError::UnresolvedName { name, reason, .. }) => {
                assert_eq!(name, "woof");
                assert!(reason.is_some());
            }
            other => panic!("expected unresolved name, got {other:?}"),
        }
    }

    #[test]
    fn test_error_spans() {
        let err = parse_query(row_type(), &NoFunctions, "id > ").unwrap_err();
        let span = err.span();
        assert_eq!((span.start, span.end), (5, 5));
    }

    #[test]
    fn test_unary_and_literals() {
        let q = parse("id > -5 && active == true");
        assert!(q.filter.is_some());
        let q = parse("salary == null");
        assert!(q.filter.is_some());
    }

    #[test]
    fn test_identity_round_trip() {
        for source in [
            "{id, name}",
            "{id, name} id > ?1",
            "{~id, +name} active && salary >= ?1",
            "id in 1..10 || !active",
            "{x = salary + 1.0} x > ?1",
        ] {
            let once = parse(source);
            let printed = once.to_string();
            let twice = parse_query(row_type(), &NoFunctions, &printed).unwrap();
            assert_eq!(once, twice, "round-trip of {source:?} via {printed:?}");
        }
    }
}
