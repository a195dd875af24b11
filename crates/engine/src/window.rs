// Copyright (c) 2025 woxQAQ
//
// Licensed under the MIT License or Apache License 2.0
// See LICENSE files for details

//! # The window engine
//!
//! [`QueryGrouper`] interprets a windowed projection over the
//! [`TableGrouper`] protocol. Every grouped call is lifted into a
//! window slot owning a sliding [`WindowBuffer`] of its (pre-converted)
//! argument values, plus a parallel buffer of ordering-key values for
//! GROUPS and RANGE frames.
//!
//! One output row is due per input row, delayed by the width of the
//! right half of the widest frame. `check` implements the ready rule:
//! ROWS frames are ready once the buffer has reached the frame end;
//! GROUPS and RANGE frames buffer a doubling lookahead until the group
//! or range boundary has actually been observed inside the buffer; open
//! ends wait for the end of input. `step` resolves the frame bounds,
//! computes over the buffer (memoizing when the physical frame did not
//! move), advances every buffer, and trims values that no future frame
//! can reach.

use std::collections::HashMap;
use std::sync::Arc;

use relq_types::{EvalError, Row, TupleType, Value};

use relq_expr::{ApplierKind, Expr, FrameMode, ProjExpr, VarExpr, WindowCompute, WindowSpec};
use relq_store::{GrouperFactory, TableGrouper};

use crate::buffer::{WindowBuffer, DEFAULT_CAPACITY};
use crate::eval::{eval, EvalContext};

/// One grouped call lifted out of the projections
#[derive(Debug, Clone)]
struct WinSlotSpec {
    name: String,
    spec: WindowSpec,
    /// Buffered value expression; `None` buffers a marker (zero-argument
    /// count, row numbering)
    arg: Option<Expr>,
}

/// The compiled, shareable form of a window operator
pub struct CompiledGroup {
    source_type: Arc<TupleType>,
    target_type: Arc<TupleType>,
    slots: Vec<WinSlotSpec>,
    projections: Vec<(String, Expr)>,
    /// Ordering key for GROUPS/RANGE frames: value expression plus
    /// descending flag
    order_key: Option<(Expr, bool)>,
    args: Vec<Value>,
}

impl CompiledGroup {
    /// Lift grouped calls out of window-normalized projections.
    pub fn build(
        source_type: Arc<TupleType>,
        target_type: Arc<TupleType>,
        projections: &[ProjExpr],
        order_key: Option<(Expr, bool)>,
        args: Vec<Value>,
    ) -> Result<Arc<CompiledGroup>, EvalError> {
        let mut slots: Vec<WinSlotSpec> = Vec::new();
        let mut rewrite: HashMap<Expr, Expr> = HashMap::new();

        for proj in projections {
            proj.expr.visit(&mut |e| {
                if let Expr::Call(call) = e {
                    if call.applier.kind() == ApplierKind::Grouped && !rewrite.contains_key(e) {
                        let spec = call
                            .applier
                            .window()
                            .expect("grouped applier exposes a window spec")
                            .clone();
                        let name = format!("#g{}", slots.len());
                        slots.push(WinSlotSpec {
                            name: name.clone(),
                            spec,
                            arg: call.args.first().cloned(),
                        });
                        rewrite.insert(
                            e.clone(),
                            Expr::Var(VarExpr {
                                span: call.span,
                                name,
                                ty: call.applier.result_type(),
                            }),
                        );
                    }
                }
            });
        }

        let projections = projections
            .iter()
            .map(|p| (p.name.clone(), p.expr.replace(&rewrite)))
            .collect();
        tracing::debug!(slots = slots.len(), "built window operator");

        Ok(Arc::new(CompiledGroup {
            source_type,
            target_type,
            slots,
            projections,
            order_key,
            args,
        }))
    }

    pub fn target_type(&self) -> &Arc<TupleType> {
        &self.target_type
    }

    /// True when any slot uses a RANGE frame over a non-trivial
    /// ordering; such plans depend on upstream ordering being present.
    pub fn is_order_dependent(&self) -> bool {
        self.slots
            .iter()
            .any(|s| matches!(s.spec.frame.mode, FrameMode::Range | FrameMode::Groups))
    }

    /// The shared factory handed to the storage layer.
    pub fn factory(self: &Arc<Self>) -> Arc<QueryGrouperFactory> {
        Arc::new(QueryGrouperFactory {
            compiled: Arc::clone(self),
        })
    }
}

/// Shared grouper factory; each scanner gets fresh window state.
pub struct QueryGrouperFactory {
    compiled: Arc<CompiledGroup>,
}

impl GrouperFactory for QueryGrouperFactory {
    fn new_grouper(&self) -> Box<dyn TableGrouper> {
        let compiled = Arc::clone(&self.compiled);
        let slots = compiled
            .slots
            .iter()
            .map(|spec| WinSlotState::new(spec.clone()))
            .collect();
        Box::new(QueryGrouper {
            compiled,
            slots,
            remaining: 0,
            input_done: false,
            abs_pos: 0,
        })
    }
}

/// A frame endpoint after argument binding
#[derive(Debug, Clone)]
enum Endpoint {
    Open,
    /// Compile-time or argument-bound constant
    Const(Value),
    /// Per-row expression, buffered alongside the values
    PerRow(Expr),
}

impl Endpoint {
    fn resolve(expr: Option<&Expr>, args: &[Value]) -> Result<Endpoint, EvalError> {
        match expr {
            None => Ok(Endpoint::Open),
            Some(e) if e.is_constant() || e.max_argument() > 0 => {
                // Constant or argument-bound: evaluates without a row.
                let row = Row::null_row(empty_tuple());
                let mut cx = EvalContext::new(&row, args);
                Ok(Endpoint::Const(eval(e, &mut cx)?))
            }
            Some(e) => Ok(Endpoint::PerRow(e.clone())),
        }
    }
}

fn empty_tuple() -> Arc<TupleType> {
    Arc::new(TupleType::new(Vec::new()).expect("empty tuple"))
}

/// Per-scan state of one window slot
struct WinSlotState {
    spec: WinSlotSpec,
    values: WindowBuffer,
    /// Ordering keys, maintained for GROUPS/RANGE frames
    keys: WindowBuffer,
    /// Buffered per-row endpoint values, when not constant
    start_buf: Option<WindowBuffer>,
    end_buf: Option<WindowBuffer>,
    start: Endpoint,
    end: Endpoint,
    /// Lookahead threshold for the GROUPS/RANGE ready check
    lookahead: i64,
    /// Physical bounds and value of the previous step, for reuse when
    /// the frame did not move
    memo: Option<(i64, i64, Value)>,
}

impl WinSlotState {
    fn new(spec: WinSlotSpec) -> Self {
        Self {
            spec,
            values: WindowBuffer::new(),
            keys: WindowBuffer::new(),
            start_buf: None,
            end_buf: None,
            start: Endpoint::Open,
            end: Endpoint::Open,
            lookahead: DEFAULT_CAPACITY as i64,
            memo: None,
        }
    }

    fn uses_keys(&self) -> bool {
        matches!(self.spec.spec.frame.mode, FrameMode::Groups | FrameMode::Range)
    }
}

/// Per-scan window state machine
pub struct QueryGrouper {
    compiled: Arc<CompiledGroup>,
    slots: Vec<WinSlotState>,
    /// Output rows still owed for accumulated input
    remaining: usize,
    input_done: bool,
    /// Absolute index of the current row within the partition
    abs_pos: i64,
}

impl QueryGrouper {
    fn feed(&mut self, row: &Row, begin: bool) -> Result<(), EvalError> {
        let compiled = Arc::clone(&self.compiled);
        let key = match &compiled.order_key {
            Some((expr, _)) => {
                let mut cx = EvalContext::new(row, &compiled.args);
                Some(eval(expr, &mut cx)?)
            }
            None => None,
        };
        for slot in &mut self.slots {
            let value = match &slot.spec.arg {
                Some(arg) => {
                    let mut cx = EvalContext::new(row, &compiled.args);
                    let v = eval(arg, &mut cx)?;
                    // Buffer in the result lane so frame sums cannot
                    // overflow a narrow input lane.
                    match slot.spec.spec.compute {
                        WindowCompute::Sum | WindowCompute::Average => {
                            v.convert(&slot.spec.spec.result_type)?
                        }
                        _ => v,
                    }
                }
                None => Value::Long(1),
            };
            if begin {
                slot.start = Endpoint::resolve(slot.spec.spec.frame.start.as_ref(), &compiled.args)?;
                slot.end = Endpoint::resolve(slot.spec.spec.frame.end.as_ref(), &compiled.args)?;
                slot.values.begin(value);
                slot.lookahead = DEFAULT_CAPACITY as i64;
                slot.memo = None;
                slot.start_buf = matches!(slot.start, Endpoint::PerRow(_)).then(WindowBuffer::new);
                slot.end_buf = matches!(slot.end, Endpoint::PerRow(_)).then(WindowBuffer::new);
            } else {
                slot.values.append(value);
            }
            if slot.uses_keys() {
                let key = key.clone().ok_or_else(|| {
                    EvalError::Unsupported(
                        "groups/range frame requires an ordering column".into(),
                    )
                })?;
                if begin {
                    slot.keys.begin(key);
                } else {
                    slot.keys.append(key);
                }
            }
            for (endpoint, buf) in [
                (&slot.start, &mut slot.start_buf),
                (&slot.end, &mut slot.end_buf),
            ] {
                if let (Endpoint::PerRow(expr), Some(buf)) = (endpoint, buf) {
                    let mut cx = EvalContext::new(row, &compiled.args);
                    let v = eval(expr, &mut cx)?;
                    if begin {
                        buf.begin(v);
                    } else {
                        buf.append(v);
                    }
                }
            }
        }
        Ok(())
    }

    fn spec_descending(&self) -> bool {
        self.compiled
            .order_key
            .as_ref()
            .map(|(_, d)| *d)
            .unwrap_or(false)
    }
}

impl TableGrouper for QueryGrouper {
    fn begin(&mut self, row: &Row) -> Result<(), EvalError> {
        self.remaining = 1;
        self.input_done = false;
        self.abs_pos = 0;
        self.feed(row, true)
    }

    fn accumulate(&mut self, row: &Row) -> Result<(), EvalError> {
        self.remaining += 1;
        self.feed(row, false)
    }

    fn finished(&mut self) {
        self.input_done = true;
    }

    fn check(&mut self) -> Result<bool, EvalError> {
        if self.remaining == 0 {
            return Ok(false);
        }
        if self.input_done {
            return Ok(true);
        }
        let descending = self.spec_descending();
        for slot in &mut self.slots {
            if !slot_ready(slot, descending)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn step(&mut self) -> Result<Row, EvalError> {
        let compiled = Arc::clone(&self.compiled);
        let descending = self.spec_descending();
        let mut vars: HashMap<String, Value> = HashMap::new();
        let abs_pos = self.abs_pos;

        for slot in &mut self.slots {
            let (fs, fe) = resolve_frame(slot, descending)?;
            let physical = (abs_pos + fs, abs_pos + fe);
            let value = match &slot.memo {
                Some((ps, pe, v)) if (*ps, *pe) == physical && fs <= fe => v.clone(),
                _ => {
                    let v = compute_frame(slot, fs, fe, abs_pos)?;
                    slot.memo = Some((physical.0, physical.1, v.clone()));
                    v
                }
            };
            vars.insert(slot.spec.name.clone(), value);

            // Slide: the next current row is one ahead; drop cells no
            // future frame can reach. Frame starts are monotone, so
            // everything strictly before the current frame start (and
            // behind the current row) is dead.
            let keep_from = fs.min(0) - 1;
            slot.values.advance();
            slot.values.trim_start(keep_from);
            if slot.uses_keys() {
                slot.keys.advance();
                slot.keys.trim_start(keep_from);
            }
            for buf in [&mut slot.start_buf, &mut slot.end_buf].into_iter().flatten() {
                buf.advance();
                buf.trim_start(0);
            }
        }

        self.abs_pos += 1;
        self.remaining -= 1;

        let source_row = Row::null_row(Arc::clone(&compiled.source_type));
        let mut cx = EvalContext::new(&source_row, &compiled.args);
        cx.vars = vars;
        let mut target = Row::null_row(Arc::clone(&compiled.target_type));
        for (name, expr) in &compiled.projections {
            let value = eval(expr, &mut cx)?;
            let index = compiled
                .target_type
                .index_of(name)
                .ok_or_else(|| EvalError::Unsupported(format!("no target column {name}")))?;
            let column = compiled.target_type.column(index);
            if value.is_null() && !column.ty.is_nullable() {
                return Err(EvalError::NullNotAllowed(name.clone()));
            }
            target.set(index, value.convert(&column.ty)?);
        }
        Ok(target)
    }
}

/// The readiness rule for one slot.
fn slot_ready(slot: &mut WinSlotState, descending: bool) -> Result<bool, EvalError> {
    match slot.spec.spec.frame.mode {
        FrameMode::Rows => {
            let fe = match &slot.end {
                Endpoint::Open => return Ok(false),
                Endpoint::Const(v) => v.to_i128().unwrap_or(0) as i64,
                Endpoint::PerRow(_) => match slot.end_buf.as_ref().and_then(|b| b.get(0)) {
                    Some(v) => v.to_i128().unwrap_or(0) as i64,
                    None => return Ok(false),
                },
            };
            Ok(slot.values.ready(fe))
        }
        FrameMode::Groups | FrameMode::Range => {
            let end = match &slot.end {
                Endpoint::Open => return Ok(false),
                Endpoint::Const(v) => v.clone(),
                Endpoint::PerRow(_) => match slot.end_buf.as_ref().and_then(|b| b.get(0)) {
                    Some(v) => v.clone(),
                    None => return Ok(false),
                },
            };
            // Require a minimum lookahead before searching, doubling
            // when the boundary is still unobserved.
            if slot.keys.end() < slot.lookahead {
                return Ok(false);
            }
            let found = match slot.spec.spec.frame.mode {
                FrameMode::Groups => {
                    let delta = end.to_i128().unwrap_or(0) as i64;
                    slot.keys.find_group_end(delta.max(0))
                }
                _ => slot.keys.find_range_end(&end, descending)?,
            };
            if found < slot.keys.end() {
                Ok(true)
            } else {
                slot.lookahead *= 2;
                Ok(false)
            }
        }
    }
}

/// Resolve the frame of the current row to buffer-relative positions.
fn resolve_frame(slot: &mut WinSlotState, descending: bool) -> Result<(i64, i64), EvalError> {
    let start_value = endpoint_value(&slot.start, slot.start_buf.as_ref())?;
    let end_value = endpoint_value(&slot.end, slot.end_buf.as_ref())?;
    match slot.spec.spec.frame.mode {
        FrameMode::Rows => {
            let fs = start_value
                .map(|v| v.to_i128().unwrap_or(i64::MIN as i128) as i64)
                .unwrap_or(slot.values.start());
            let fe = end_value
                .map(|v| v.to_i128().unwrap_or(i64::MAX as i128) as i64)
                .unwrap_or(slot.values.end());
            Ok((fs.max(slot.values.start()), fe.min(slot.values.end())))
        }
        FrameMode::Groups => {
            let fs = match start_value {
                None => slot.keys.start(),
                Some(v) => {
                    let delta = v.to_i128().unwrap_or(0) as i64;
                    if delta <= 0 {
                        slot.keys.find_group_start(delta)
                    } else {
                        (slot.keys.find_group_end(delta - 1) + 1).min(slot.keys.end())
                    }
                }
            };
            let fe = match end_value {
                None => slot.keys.end(),
                Some(v) => {
                    let delta = v.to_i128().unwrap_or(0) as i64;
                    if delta >= 0 {
                        slot.keys.find_group_end(delta)
                    } else {
                        (slot.keys.find_group_start(delta + 1) - 1).max(slot.keys.start())
                    }
                }
            };
            Ok((fs, fe))
        }
        FrameMode::Range => {
            let fs = match start_value {
                None => slot.keys.start(),
                Some(v) => slot.keys.find_range_start(&v, descending)?,
            };
            let fe = match end_value {
                None => slot.keys.end(),
                Some(v) => slot.keys.find_range_end(&v, descending)?,
            };
            Ok((fs, fe))
        }
    }
}

fn endpoint_value(
    endpoint: &Endpoint,
    buf: Option<&WindowBuffer>,
) -> Result<Option<Value>, EvalError> {
    match endpoint {
        Endpoint::Open => Ok(None),
        Endpoint::Const(v) => Ok(Some(v.clone())),
        Endpoint::PerRow(_) => buf
            .and_then(|b| b.get(0))
            .cloned()
            .map(Some)
            .ok_or_else(|| EvalError::Unsupported("frame endpoint not buffered".into())),
    }
}

fn compute_frame(
    slot: &WinSlotState,
    fs: i64,
    fe: i64,
    abs_pos: i64,
) -> Result<Value, EvalError> {
    if slot.spec.spec.compute == WindowCompute::RowNumber {
        return Ok(Value::Long(abs_pos + 1));
    }
    let empty = fs > fe || slot.values.clamp(fs, fe).is_none();
    if empty {
        return Ok(match slot.spec.spec.compute {
            WindowCompute::Count => Value::Long(0),
            _ => slot.spec.spec.empty_result.clone().unwrap_or(Value::Null),
        });
    }
    Ok(match slot.spec.spec.compute {
        WindowCompute::Count => Value::Long(slot.values.frame_count(fs, fe) as i64),
        WindowCompute::Sum => {
            let sum = slot.values.frame_sum(fs, fe)?;
            if sum.is_null() {
                slot.spec.spec.empty_result.clone().unwrap_or(Value::Null)
            } else {
                sum
            }
        }
        WindowCompute::Average => slot.values.frame_average(fs, fe)?,
        WindowCompute::Min => slot.values.frame_min(fs, fe)?,
        WindowCompute::Max => slot.values.frame_max(fs, fe)?,
        WindowCompute::First => slot.values.frame_first(fs, fe),
        WindowCompute::Last => slot.values.frame_last(fs, fe),
        WindowCompute::RowNumber => unreachable!(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relq_expr::apply::FrameSpec;
    use relq_expr::{ConstantExpr, FunctionApplier, Span};
    use relq_types::{Column, Primitive, Type};

    #[derive(Debug)]
    struct WinAvg {
        spec: WindowSpec,
    }

    impl FunctionApplier for WinAvg {
        fn name(&self) -> &str {
            "avg"
        }
        fn kind(&self) -> ApplierKind {
            ApplierKind::Grouped
        }
        fn result_type(&self) -> Type {
            self.spec.result_type.clone()
        }
        fn validate(
            &self,
            _args: &[Expr],
            _named: &[(String, Expr)],
            _reason: &mut Option<String>,
        ) -> Option<Arc<dyn FunctionApplier>> {
            None
        }
        fn window(&self) -> Option<&WindowSpec> {
            Some(&self.spec)
        }
    }

    fn source_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("id", Type::basic(Primitive::Long)),
            Column::new("salary", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    fn target_type() -> Arc<TupleType> {
        TupleType::shared(vec![
            Column::new("avg3", Type::basic_nullable(Primitive::Double)),
        ])
        .unwrap()
    }

    fn constant(v: i64) -> Expr {
        Expr::Constant(ConstantExpr::new(Span::default(), Value::Long(v)))
    }

    fn build_rows_frame(compute: WindowCompute, start: i64, end: i64) -> Arc<CompiledGroup> {
        let spec = WindowSpec {
            compute,
            frame: FrameSpec {
                mode: FrameMode::Rows,
                start: Some(constant(start)),
                end: Some(constant(end)),
            },
            result_type: Type::basic_nullable(Primitive::Double),
            empty_result: None,
        };
        let salary = Expr::Column(
            relq_expr::ColumnExpr::resolve(Span::default(), source_type(), vec!["salary".into()])
                .unwrap(),
        );
        let call = Expr::Call(Box::new(relq_expr::CallExpr {
            span: Span::default(),
            name: "avg".into(),
            args: vec![salary],
            named_args: vec![],
            applier: Arc::new(WinAvg { spec }),
        }));
        let projections = vec![ProjExpr::make(
            Span::default(),
            "avg3".into(),
            Default::default(),
            call,
        )
        .unwrap()];
        CompiledGroup::build(source_type(), target_type(), &projections, None, vec![]).unwrap()
    }

    fn row(id: i64, salary: f64) -> Row {
        Row::new(
            source_type(),
            vec![Value::Long(id), Value::Double(salary)],
        )
        .unwrap()
    }

    fn run(compiled: &Arc<CompiledGroup>, rows: &[Row]) -> Vec<Value> {
        let mut grouper = compiled.factory().new_grouper();
        let mut out = Vec::new();
        let mut drain = |g: &mut Box<dyn TableGrouper>, out: &mut Vec<Value>| {
            while g.check().unwrap() {
                let r = g.step().unwrap();
                out.push(r.get(0).clone());
            }
        };
        for (i, r) in rows.iter().enumerate() {
            if i == 0 {
                grouper.begin(r).unwrap();
            } else {
                grouper.accumulate(r).unwrap();
            }
            drain(&mut grouper, &mut out);
        }
        grouper.finished();
        drain(&mut grouper, &mut out);
        out
    }

    #[test]
    fn test_sliding_average_rows_frame() {
        // avg over rows -1..1 of [10, 20, 30, 40]: edges average what
        // is available.
        let compiled = build_rows_frame(WindowCompute::Average, -1, 1);
        let out = run(
            &compiled,
            &[row(1, 10.0), row(2, 20.0), row(3, 30.0), row(4, 40.0)],
        );
        assert_eq!(
            out,
            vec![
                Value::Double(15.0),
                Value::Double(20.0),
                Value::Double(30.0),
                Value::Double(35.0),
            ]
        );
    }

    #[test]
    fn test_row_delay_matches_frame_end() {
        // With a frame ending at +1, the first output needs two input
        // rows.
        let compiled = build_rows_frame(WindowCompute::Average, -1, 1);
        let mut grouper = compiled.factory().new_grouper();
        grouper.begin(&row(1, 10.0)).unwrap();
        assert!(!grouper.check().unwrap());
        grouper.accumulate(&row(2, 20.0)).unwrap();
        assert!(grouper.check().unwrap());
    }

    #[test]
    fn test_trailing_sum() {
        // sum over rows -2..0.
        let compiled = build_rows_frame(WindowCompute::Sum, -2, 0);
        let out = run(
            &compiled,
            &[row(1, 1.0), row(2, 2.0), row(3, 4.0), row(4, 8.0)],
        );
        assert_eq!(
            out,
            vec![
                Value::Double(1.0),
                Value::Double(3.0),
                Value::Double(7.0),
                Value::Double(14.0),
            ]
        );
    }

    #[test]
    fn test_whole_partition_frame() {
        // Open-ended both sides: every row sees the partition total,
        // and nothing is ready before the input finishes.
        let spec = WindowSpec {
            compute: WindowCompute::Sum,
            frame: FrameSpec {
                mode: FrameMode::Rows,
                start: None,
                end: None,
            },
            result_type: Type::basic_nullable(Primitive::Double),
            empty_result: None,
        };
        let salary = Expr::Column(
            relq_expr::ColumnExpr::resolve(Span::default(), source_type(), vec!["salary".into()])
                .unwrap(),
        );
        let call = Expr::Call(Box::new(relq_expr::CallExpr {
            span: Span::default(),
            name: "sum".into(),
            args: vec![salary],
            named_args: vec![],
            applier: Arc::new(WinAvg { spec }),
        }));
        let projections = vec![ProjExpr::make(
            Span::default(),
            "avg3".into(),
            Default::default(),
            call,
        )
        .unwrap()];
        let compiled =
            CompiledGroup::build(source_type(), target_type(), &projections, None, vec![])
                .unwrap();

        let mut grouper = compiled.factory().new_grouper();
        grouper.begin(&row(1, 1.0)).unwrap();
        assert!(!grouper.check().unwrap());
        grouper.accumulate(&row(2, 2.0)).unwrap();
        assert!(!grouper.check().unwrap());
        grouper.finished();
        let mut out = Vec::new();
        while grouper.check().unwrap() {
            out.push(grouper.step().unwrap().get(0).clone());
        }
        assert_eq!(
            out,
            vec![Value::Double(3.0), Value::Double(3.0)]
        );
    }
}
