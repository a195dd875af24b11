// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # Aggregated builtins and their window forms
//!
//! `count`, `first`, `last`, `min`, `max`, `sum`, `avg` and `grn`
//! validate as per-group accumulators. When a call carries a `rows`,
//! `groups` or `range` named argument, validation converts the applier
//! to its grouped (window) form instead: the same computation described
//! as a [`WindowSpec`] the window engine interprets over its sliding
//! buffer.
//!
//! Result typing: `sum` widens fixed integer lanes (`long` for signed,
//! `ulong` for unsigned) so accumulation has headroom; `avg` promotes
//! integers to `double` and the big lanes to `big_decimal`. A nullable
//! source makes both nullable, since a group of nulls sums to null. A
//! window frame that cannot be proven to include the current row makes
//! every value-producing window nullable.

use std::sync::Arc;

use relq_types::{arith, EvalError, Primitive, Type, Value};

use relq_expr::{
    Accumulator, ApplierKind, Expr, FrameSpec, FunctionApplier, WindowCompute, WindowSpec,
};

use super::{frame_has_current, take_frame};

/// Which aggregate a template stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggKind {
    Count,
    First,
    Last,
    Min,
    Max,
    Sum,
    Avg,
    Grn,
}

impl AggKind {
    fn name(self) -> &'static str {
        match self {
            AggKind::Count => "count",
            AggKind::First => "first",
            AggKind::Last => "last",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Sum => "sum",
            AggKind::Avg => "avg",
            AggKind::Grn => "grn",
        }
    }

    fn compute(self) -> WindowCompute {
        match self {
            AggKind::Count => WindowCompute::Count,
            AggKind::First => WindowCompute::First,
            AggKind::Last => WindowCompute::Last,
            AggKind::Min => WindowCompute::Min,
            AggKind::Max => WindowCompute::Max,
            AggKind::Sum => WindowCompute::Sum,
            AggKind::Avg => WindowCompute::Average,
            AggKind::Grn => WindowCompute::RowNumber,
        }
    }
}

/// Template applier for an aggregated builtin name.
pub fn template(name: &str) -> Arc<dyn FunctionApplier> {
    let kind = match name {
        "count" => AggKind::Count,
        "first" => AggKind::First,
        "last" => AggKind::Last,
        "min" => AggKind::Min,
        "max" => AggKind::Max,
        "sum" => AggKind::Sum,
        "avg" => AggKind::Avg,
        "grn" => AggKind::Grn,
        other => unreachable!("not an aggregated builtin: {other}"),
    };
    Arc::new(AggregateApplier {
        kind,
        result: Type::Any,
    })
}

fn sum_lane(p: Primitive) -> Primitive {
    match p {
        Primitive::Byte | Primitive::Short | Primitive::Int | Primitive::Long => Primitive::Long,
        Primitive::UByte | Primitive::UShort | Primitive::UInt | Primitive::ULong => {
            Primitive::ULong
        }
        Primitive::Float | Primitive::Double => Primitive::Double,
        other => other,
    }
}

fn avg_lane(p: Primitive) -> Primitive {
    match p {
        Primitive::BigInteger | Primitive::BigDecimal => Primitive::BigDecimal,
        _ => Primitive::Double,
    }
}

/// A validated per-group aggregate
#[derive(Debug)]
struct AggregateApplier {
    kind: AggKind,
    result: Type,
}

impl AggregateApplier {
    /// Resolve the result type from the argument type, or fail with a
    /// reason.
    fn resolve(&self, args: &[Expr], reason: &mut Option<String>) -> Option<Type> {
        let name = self.kind.name();
        match self.kind {
            AggKind::Count => {
                if args.len() > 1 {
                    *reason = Some(format!("{name} takes at most one argument"));
                    return None;
                }
                Some(Type::basic(Primitive::Long))
            }
            AggKind::Grn => {
                if !args.is_empty() {
                    *reason = Some(format!("{name} takes no arguments"));
                    return None;
                }
                Some(Type::basic(Primitive::Long))
            }
            _ => {
                if args.len() != 1 {
                    *reason = Some(format!("{name} requires exactly one argument"));
                    return None;
                }
                let arg = args[0].ty();
                match self.kind {
                    AggKind::First | AggKind::Last => Some(arg),
                    AggKind::Min | AggKind::Max => {
                        let comparable = arg.is_number()
                            || matches!(
                                arg.primitive(),
                                Some(Primitive::Text | Primitive::Char)
                            );
                        if !comparable {
                            *reason =
                                Some(format!("{name} requires a comparable argument, found {arg}"));
                            return None;
                        }
                        Some(arg)
                    }
                    AggKind::Sum | AggKind::Avg => {
                        if !arg.is_number() {
                            *reason =
                                Some(format!("{name} requires a numeric argument, found {arg}"));
                            return None;
                        }
                        let lane = arg.primitive().expect("numeric lane");
                        let lane = if self.kind == AggKind::Sum {
                            sum_lane(lane)
                        } else {
                            avg_lane(lane)
                        };
                        let result = Type::basic(lane);
                        // A group of nulls aggregates to null.
                        Some(if arg.is_nullable() {
                            result.nullable()
                        } else {
                            result
                        })
                    }
                    _ => unreachable!(),
                }
            }
        }
    }
}

impl FunctionApplier for AggregateApplier {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Aggregated
    }

    fn result_type(&self) -> Type {
        self.result.clone()
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        let frame = match take_frame(self.kind.name(), named_args, reason) {
            Ok(frame) => frame,
            Err(()) => return None,
        };
        let result = self.resolve(args, reason)?;
        match frame {
            None => Some(Arc::new(AggregateApplier {
                kind: self.kind,
                result,
            })),
            Some(frame) => Some(window_form(self.kind, result, frame)),
        }
    }

    fn new_accumulator(&self) -> Option<Box<dyn Accumulator>> {
        Some(match self.kind {
            AggKind::Count => Box::new(CountAcc { count: 0 }),
            AggKind::First => Box::new(FirstAcc { value: Value::Null }),
            AggKind::Last => Box::new(LastAcc { value: Value::Null }),
            AggKind::Min => Box::new(FoldAcc {
                value: Value::Null,
                fold: arith::min,
            }),
            AggKind::Max => Box::new(FoldAcc {
                value: Value::Null,
                fold: arith::max,
            }),
            AggKind::Sum => Box::new(SumAcc {
                total: Value::Null,
                lane: self.result.non_nullable(),
            }),
            AggKind::Avg => Box::new(AvgAcc {
                total: Value::Null,
                count: 0,
                lane: self.result.non_nullable(),
            }),
            AggKind::Grn => Box::new(GrnAcc { row: 0 }),
        })
    }
}

/// Convert an aggregate to its grouped (window) form.
fn window_form(kind: AggKind, result: Type, frame: FrameSpec) -> Arc<dyn FunctionApplier> {
    let value_producing = !matches!(kind, AggKind::Count | AggKind::Grn);
    let result = if value_producing && !frame_has_current(&frame) {
        result.nullable()
    } else {
        result
    };
    Arc::new(WindowApplier {
        kind,
        spec: WindowSpec {
            compute: kind.compute(),
            frame,
            result_type: result.clone(),
            empty_result: value_producing.then_some(Value::Null),
        },
    })
}

/// A validated window function
#[derive(Debug)]
struct WindowApplier {
    kind: AggKind,
    spec: WindowSpec,
}

impl FunctionApplier for WindowApplier {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn kind(&self) -> ApplierKind {
        ApplierKind::Grouped
    }

    fn result_type(&self) -> Type {
        self.spec.result_type.clone()
    }

    fn validate(
        &self,
        args: &[Expr],
        named_args: &[(String, Expr)],
        reason: &mut Option<String>,
    ) -> Option<Arc<dyn FunctionApplier>> {
        // Already refined; revalidation goes through the template.
        template(self.kind.name()).validate(args, named_args, reason)
    }

    fn window(&self) -> Option<&WindowSpec> {
        Some(&self.spec)
    }
}

struct CountAcc {
    count: i64,
}

impl Accumulator for CountAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.count = 0;
        self.accumulate(args)
    }

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        // Zero-argument count counts rows; one-argument counts
        // non-null values.
        if args.is_empty() || !args[0].is_null() {
            self.count += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(Value::Long(self.count))
    }
}

struct FirstAcc {
    value: Value,
}

impl Accumulator for FirstAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.value = args[0].clone();
        Ok(())
    }

    fn accumulate(&mut self, _args: &[Value]) -> Result<(), EvalError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(self.value.clone())
    }
}

struct LastAcc {
    value: Value,
}

impl Accumulator for LastAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.accumulate(args)
    }

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.value = args[0].clone();
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(self.value.clone())
    }
}

/// min/max as a fold over the comparison helpers, which skip nulls
struct FoldAcc {
    value: Value,
    fold: fn(&Value, &Value) -> Result<Value, relq_types::ArithmeticError>,
}

impl Accumulator for FoldAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.value = Value::Null;
        self.accumulate(args)
    }

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.value = (self.fold)(&self.value, &args[0])?;
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(self.value.clone())
    }
}

struct SumAcc {
    total: Value,
    lane: Type,
}

impl Accumulator for SumAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.total = Value::Null;
        self.accumulate(args)
    }

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        if args[0].is_null() {
            return Ok(());
        }
        let v = args[0].convert(&self.lane)?;
        self.total = if self.total.is_null() {
            v
        } else {
            arith::apply(arith::ArithOp::Add, &self.total, &v)?
        };
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(self.total.clone())
    }
}

struct AvgAcc {
    total: Value,
    count: i64,
    lane: Type,
}

impl Accumulator for AvgAcc {
    fn begin(&mut self, args: &[Value]) -> Result<(), EvalError> {
        self.total = Value::Null;
        self.count = 0;
        self.accumulate(args)
    }

    fn accumulate(&mut self, args: &[Value]) -> Result<(), EvalError> {
        if args[0].is_null() {
            return Ok(());
        }
        let v = args[0].convert(&self.lane)?;
        self.count += 1;
        self.total = if self.total.is_null() {
            v
        } else {
            arith::apply(arith::ArithOp::Add, &self.total, &v)?
        };
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        if self.total.is_null() {
            return Ok(Value::Null);
        }
        let divisor = Value::Long(self.count).convert(&self.lane)?;
        Ok(arith::apply(arith::ArithOp::Div, &self.total, &divisor)?)
    }
}

/// Group row number: the group size at finish
struct GrnAcc {
    row: i64,
}

impl Accumulator for GrnAcc {
    fn begin(&mut self, _args: &[Value]) -> Result<(), EvalError> {
        self.row = 1;
        Ok(())
    }

    fn accumulate(&mut self, _args: &[Value]) -> Result<(), EvalError> {
        self.row += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<Value, EvalError> {
        Ok(Value::Long(self.row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_expr::{ConstantExpr, RangeExpr, Span};

    fn constant(v: Value) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), v))
    }

    fn nullable_double() -> Expr {
        constant(Value::Null)
            .as_type(&Type::basic_nullable(Primitive::Double))
            .unwrap()
    }

    #[test]
    fn test_sum_widens_and_tracks_nullability() {
        let mut reason = None;
        let a = template("sum")
            .validate(&[constant(Value::Int(1))], &[], &mut reason)
            .unwrap();
        assert_eq!(a.result_type(), Type::basic(Primitive::Long));

        let a = template("sum")
            .validate(&[nullable_double()], &[], &mut reason)
            .unwrap();
        assert_eq!(a.result_type(), Type::basic_nullable(Primitive::Double));
    }

    #[test]
    fn test_avg_promotes() {
        let mut reason = None;
        let a = template("avg")
            .validate(&[constant(Value::Int(1))], &[], &mut reason)
            .unwrap();
        assert_eq!(a.result_type(), Type::basic(Primitive::Double));

        let a = template("avg")
            .validate(
                &[constant(Value::BigInteger(num_bigint::BigInt::from(1)))],
                &[],
                &mut reason,
            )
            .unwrap();
        assert_eq!(a.result_type(), Type::basic(Primitive::BigDecimal));
    }

    #[test]
    fn test_count_overloads() {
        let mut reason = None;
        let zero = template("count").validate(&[], &[], &mut reason).unwrap();
        let mut acc = zero.new_accumulator().unwrap();
        acc.begin(&[]).unwrap();
        acc.accumulate(&[]).unwrap();
        assert_eq!(acc.finish().unwrap(), Value::Long(2));

        let one = template("count")
            .validate(&[nullable_double()], &[], &mut reason)
            .unwrap();
        let mut acc = one.new_accumulator().unwrap();
        acc.begin(&[Value::Null]).unwrap();
        acc.accumulate(&[Value::Double(1.0)]).unwrap();
        acc.accumulate(&[Value::Null]).unwrap();
        assert_eq!(acc.finish().unwrap(), Value::Long(1));
    }

    #[test]
    fn test_sum_skips_nulls() {
        let mut reason = None;
        let a = template("sum")
            .validate(&[nullable_double()], &[], &mut reason)
            .unwrap();
        let mut acc = a.new_accumulator().unwrap();
        acc.begin(&[Value::Double(10.0)]).unwrap();
        acc.accumulate(&[Value::Null]).unwrap();
        acc.accumulate(&[Value::Double(5.0)]).unwrap();
        assert_eq!(acc.finish().unwrap(), Value::Double(15.0));
    }

    #[test]
    fn test_min_max_unsigned() {
        let mut reason = None;
        let a = template("max")
            .validate(&[constant(Value::ULong(1))], &[], &mut reason)
            .unwrap();
        let mut acc = a.new_accumulator().unwrap();
        acc.begin(&[Value::ULong(u64::MAX)]).unwrap();
        acc.accumulate(&[Value::ULong(1)]).unwrap();
        assert_eq!(acc.finish().unwrap(), Value::ULong(u64::MAX));
    }

    #[test]
    fn test_frame_converts_to_window() {
        let mut reason = None;
        let frame = RangeExpr::make(
            Span::default(),
            Some(constant(Value::Long(-1))),
            Some(constant(Value::Long(1))),
        )
        .unwrap();
        let a = template("avg")
            .validate(
                &[constant(Value::Double(1.0))],
                &[("rows".into(), frame)],
                &mut reason,
            )
            .unwrap();
        assert_eq!(a.kind(), ApplierKind::Grouped);
        let spec = a.window().unwrap();
        assert_eq!(spec.compute, WindowCompute::Average);
        // Frame covers the current row: result stays non-nullable.
        assert!(!spec.result_type.is_nullable());
    }

    #[test]
    fn test_forward_frame_is_nullable() {
        let mut reason = None;
        let frame = RangeExpr::make(
            Span::default(),
            Some(constant(Value::Long(1))),
            Some(constant(Value::Long(2))),
        )
        .unwrap();
        let a = template("min")
            .validate(
                &[constant(Value::Double(1.0))],
                &[("rows".into(), frame)],
                &mut reason,
            )
            .unwrap();
        assert!(a.result_type().is_nullable());
    }

    #[test]
    fn test_unknown_named_argument() {
        let mut reason = None;
        assert!(template("sum")
            .validate(
                &[constant(Value::Int(1))],
                &[("window".into(), constant(Value::Int(1)))],
                &mut reason,
            )
            .is_none());
        assert!(reason.unwrap().contains("unknown named argument"));
    }
}
