//! Shippability classifier.
//!
//! Decides whether an expression can be evaluated by the remote server with
//! the same result the host would compute. The walk is depth-first, left to
//! right, and stops descending as soon as one node is rejected.
//!
//! A rejected expression is not an error: [`classify`] returns `Ok(false)`.
//! Only catalog inconsistencies (a missing operator or function entry, an
//! operator applied to the wrong number of operands) produce an `Err`.

use tracing::trace;

use crate::error::FdwError;
use crate::pushdown::catalog::{MetadataOracle, lookup_function, lookup_operator};
use crate::pushdown::collation::{CollationState, CollationTracker};
use crate::pushdown::expr::{
    AggSplit, Aggref, Expr, FuncExpr, FuncFormat, OpExpr, Oid, ParamKind,
    SELF_ITEM_POINTER_ATTRIBUTE_NUMBER, Var,
};
use crate::pushdown::relation::ForeignRelation;

/// Built-in operators whose remote counterparts are functions with other
/// names (`REGEXP_LIKE`, `MOD`, `UPPER(..) LIKE UPPER(..)`).
pub const EXCLUDED_OPERATORS: &[&str] = &["~", "!~", "~*", "!~*", "~~*", "!~~*", "%"];

/// Whether `expr` can be evaluated remotely for a scan of `relation`.
pub fn classify(
    expr: &Expr,
    relation: &ForeignRelation,
    oracle: &dyn MetadataOracle,
) -> Result<bool, FdwError> {
    let mut cx = InspectionContext::new(relation, oracle);
    cx.inspect(expr)?;
    Ok(cx.is_shippable())
}

/// State of one classification pass.
pub struct InspectionContext<'a> {
    relation: &'a ForeignRelation,
    oracle: &'a dyn MetadataOracle,
    shippable: bool,
    collation: CollationTracker,
}

impl<'a> InspectionContext<'a> {
    pub fn new(relation: &'a ForeignRelation, oracle: &'a dyn MetadataOracle) -> Self {
        InspectionContext {
            relation,
            oracle,
            shippable: true,
            collation: CollationTracker::new(),
        }
    }

    pub fn is_shippable(&self) -> bool {
        self.shippable && !self.collation.currently_unsafe()
    }

    pub fn collation_state(&self) -> CollationState {
        self.collation.state()
    }

    fn reject(&mut self, node: &str, reason: &str) {
        trace!(node, reason, "expression not shippable");
        self.shippable = false;
    }

    fn fold_collation(&mut self, collation: Option<Oid>) {
        if self.collation.merge_collation(collation) == CollationState::UnsafeToShip {
            self.reject("collation", "conflicting collations");
        }
    }

    fn inspect_all(&mut self, exprs: &[Expr]) -> Result<(), FdwError> {
        for expr in exprs {
            if !self.shippable {
                break;
            }
            self.inspect(expr)?;
        }
        Ok(())
    }

    /// Visit `expr` and its children.
    pub fn inspect(&mut self, expr: &Expr) -> Result<(), FdwError> {
        if !self.shippable {
            return Ok(());
        }

        match expr {
            Expr::Var(var) => self.inspect_var(var),
            Expr::Const(c) => {
                self.fold_collation(c.collation);
                Ok(())
            }
            Expr::Param(param) => {
                if param.kind == ParamKind::MultiExpr {
                    self.reject("Param", "multi-expression parameter");
                } else {
                    self.fold_collation(param.collation);
                }
                Ok(())
            }
            Expr::FuncExpr(func) => self.inspect_function(func),
            Expr::OpExpr(op) => self.inspect_operator(op, "OpExpr"),
            Expr::DistinctExpr(op) => self.inspect_operator(op, "DistinctExpr"),
            Expr::BoolExpr(b) => {
                self.inspect_all(&b.args)?;
                self.fold_after_children(None);
                Ok(())
            }
            Expr::NullTest(nt) => {
                self.inspect(&nt.arg)?;
                self.fold_after_children(None);
                Ok(())
            }
            Expr::ArrayExpr(arr) => {
                self.inspect_all(&arr.elements)?;
                self.fold_after_children(arr.collation);
                Ok(())
            }
            Expr::List(items) => self.inspect_all(items),
            Expr::Aggref(agg) => self.inspect_aggregate(agg),
            Expr::Unsupported(tag) => {
                self.reject(tag, "unsupported node type");
                Ok(())
            }
        }
    }

    fn fold_after_children(&mut self, collation: Option<Oid>) {
        if self.shippable {
            self.fold_collation(collation);
        }
    }

    fn inspect_var(&mut self, var: &Var) -> Result<(), FdwError> {
        if var.attno < 0 && var.attno != SELF_ITEM_POINTER_ATTRIBUTE_NUMBER {
            self.reject("Var", "system column");
        } else if var.attno == 0 {
            self.reject("Var", "whole-row reference");
        } else if var.levels_up != 0 {
            self.reject("Var", "outer query reference");
        } else if !self.relation.relids.contains(&var.rel_index) {
            self.reject("Var", "column of a relation outside the scan");
        } else {
            self.fold_collation(var.collation);
        }
        Ok(())
    }

    fn inspect_function(&mut self, func: &FuncExpr) -> Result<(), FdwError> {
        if !self.oracle.is_builtin_compatible(func.func_oid) {
            self.reject("FuncExpr", "not a built-in function");
            return Ok(());
        }
        let info = lookup_function(self.oracle, func.func_oid)?;
        if !info.volatility.is_immutable() {
            self.reject("FuncExpr", "function is not immutable");
            return Ok(());
        }
        match func.format {
            FuncFormat::Call => {}
            // Cast functions are named after host types.
            FuncFormat::ExplicitCast => {
                self.reject("FuncExpr", "explicit cast");
                return Ok(());
            }
            FuncFormat::ImplicitCast if func.args.len() != 1 => {
                self.reject("FuncExpr", "multi-argument implicit cast");
                return Ok(());
            }
            FuncFormat::ImplicitCast => {}
        }

        self.inspect_all(&func.args)?;
        self.fold_after_children(func.input_collation);
        self.fold_after_children(func.collation);
        Ok(())
    }

    fn inspect_operator(&mut self, op: &OpExpr, node: &str) -> Result<(), FdwError> {
        if !self.oracle.is_builtin_compatible(op.op_oid) {
            self.reject(node, "not a built-in operator");
            return Ok(());
        }
        let info = lookup_operator(self.oracle, op.op_oid)?;
        let expected = info.kind.arity();
        if op.args.len() != expected {
            return Err(FdwError::ArityMismatch {
                oid: op.op_oid,
                expected,
                actual: op.args.len(),
            });
        }
        if EXCLUDED_OPERATORS.contains(&info.name.as_str()) {
            self.reject(node, "operator has no same-named remote equivalent");
            return Ok(());
        }
        if !info.volatility.is_immutable() {
            self.reject(node, "operator is not immutable");
            return Ok(());
        }

        self.inspect_all(&op.args)?;
        self.fold_after_children(op.input_collation);
        self.fold_after_children(op.collation);
        Ok(())
    }

    fn inspect_aggregate(&mut self, agg: &Aggref) -> Result<(), FdwError> {
        if !self.relation.is_upper {
            self.reject("Aggref", "aggregate outside an upper relation");
            return Ok(());
        }
        if agg.split != AggSplit::Simple {
            self.reject("Aggref", "partial aggregation");
            return Ok(());
        }
        if !self.oracle.is_builtin_compatible(agg.agg_oid) {
            self.reject("Aggref", "not a built-in aggregate");
            return Ok(());
        }
        if !lookup_function(self.oracle, agg.agg_oid)?
            .volatility
            .is_immutable()
        {
            self.reject("Aggref", "aggregate is not immutable");
            return Ok(());
        }
        // Arguments are not inspected yet, so the aggregate stays local.
        self.reject("Aggref", "aggregate pushdown not supported");
        Ok(())
    }
}
