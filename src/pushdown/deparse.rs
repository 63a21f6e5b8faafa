//! SQL deparser for the remote dialect.
//!
//! Renders the scan's target list, its FROM clause and the remote
//! conditions into one SELECT statement, and builds parameterized INSERT
//! statements. Only expressions accepted by [`crate::pushdown::classify`]
//! are expected here; anything else is an internal error.
//!
//! Parentheses that belong to the statement structure go through
//! [`DeparseContext::open_paren`] / [`DeparseContext::close_paren`], which
//! are the only code that touches the depth counter. A statement whose depth
//! is not zero at the end is rejected.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FdwError;
use crate::pushdown::catalog::{MetadataOracle, OperatorKind, lookup_function, lookup_operator};
use crate::pushdown::expr::{
    AttrNumber, BoolExprType, Const, Datum, Expr, FuncFormat, NullTestType, OpExpr, Oid, Param,
    ParamKind, SELF_ITEM_POINTER_ATTRIBUTE_NUMBER, TABLE_OID_ATTRIBUTE_NUMBER, Var,
};
use crate::pushdown::literal::{self, LiteralCategory};
use crate::pushdown::relation::ForeignRelation;

/// Prefix of generated relation aliases (`r1`, `r2`, ...).
pub const REL_ALIAS_PREFIX: &str = "r";

/// The remote row identifier pseudo-column.
pub const ROW_IDENTIFIER: &str = "ROWID";

/// Clause appended to the relation for flashback reads; the snapshot
/// token is bound to the placeholder.
pub const AS_OF_CLAUSE: &str = " as of tsn ?";

/// Quote an identifier for the remote server.
///
/// Always quotes, so remote names keep their exact case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Remote spelling of a host operator name.
pub fn remote_operator_name(name: &str) -> &str {
    match name {
        "~~" => "LIKE",
        "!~~" => "NOT LIKE",
        other => other,
    }
}

/// A value the caller binds to a `?` placeholder, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindSlot {
    /// The flashback snapshot token of ` as of tsn ?`.
    AsOfToken,
    /// A query parameter.
    Param {
        kind: ParamKind,
        id: i32,
        type_oid: Oid,
    },
}

/// A rendered SELECT statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeparsedSelect {
    pub sql: String,
    /// Attribute numbers of the result columns, in target-list order; the
    /// row identifier is recorded as `-1`.
    pub retrieved_attrs: Vec<AttrNumber>,
    pub params: Vec<BindSlot>,
}

/// Mutable state of one rendering pass.
pub struct DeparseContext<'a> {
    relation: &'a ForeignRelation,
    oracle: &'a dyn MetadataOracle,
    buf: String,
    depth: i32,
    params: Vec<BindSlot>,
    use_fb_query: bool,
}

impl<'a> DeparseContext<'a> {
    pub fn new(
        relation: &'a ForeignRelation,
        oracle: &'a dyn MetadataOracle,
        use_fb_query: bool,
    ) -> Self {
        DeparseContext {
            relation,
            oracle,
            buf: String::with_capacity(256),
            depth: 0,
            params: Vec::new(),
            use_fb_query,
        }
    }

    pub fn open_paren(&mut self) {
        self.buf.push('(');
        self.depth += 1;
    }

    pub fn close_paren(&mut self) {
        self.buf.push(')');
        self.depth -= 1;
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    fn push(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    /// Check the balance invariant and hand over the buffer.
    fn finish(self) -> Result<(String, Vec<BindSlot>), FdwError> {
        if self.depth != 0 {
            return Err(FdwError::UnbalancedParentheses(self.depth));
        }
        Ok((self.buf, self.params))
    }

    // ── Statement parts ────────────────────────────────────────────────

    fn qualifier(&mut self, rel_index: u32) {
        self.buf.push_str(REL_ALIAS_PREFIX);
        self.buf.push_str(&rel_index.to_string());
        self.buf.push('.');
    }

    /// Comma-separated column list for the relation's used attributes.
    /// Returns the attribute numbers in emission order.
    fn append_target_list(
        &mut self,
        whole_row: bool,
        qualify: bool,
    ) -> Result<Vec<AttrNumber>, FdwError> {
        let relation = self.relation;
        let mut retrieved = Vec::new();

        for column in relation.columns.iter().filter(|c| !c.is_dropped) {
            if !(whole_row || relation.attrs_used.wants(column.attno)) {
                continue;
            }
            if !retrieved.is_empty() {
                self.push(", ");
            }
            self.append_column_ref(relation.rt_index, column.attno, qualify)?;
            retrieved.push(column.attno);
        }

        if relation.attrs_used.row_identifier && !whole_row {
            if !retrieved.is_empty() {
                self.push(", ");
            }
            self.append_column_ref(relation.rt_index, SELF_ITEM_POINTER_ATTRIBUTE_NUMBER, qualify)?;
            retrieved.push(SELF_ITEM_POINTER_ATTRIBUTE_NUMBER);
        }

        Ok(retrieved)
    }

    /// `"owner"."table"`, the as-of clause, and the alias when qualified.
    fn append_relation(&mut self, with_as_of: bool, with_alias: bool) {
        let relation = self.relation;
        let location = self.oracle.foreign_table_location(relation.table_oid);
        let table_name = location
            .table_name
            .unwrap_or_else(|| relation.relation_name.clone());

        if let Some(owner) = location.owner_name {
            self.push(&quote_ident(&owner));
            self.push(".");
        }
        self.push(&quote_ident(&table_name));

        if with_as_of && self.use_fb_query && !self.oracle.uses_transaction_snapshot() {
            self.push(AS_OF_CLAUSE);
            self.params.push(BindSlot::AsOfToken);
        }
        if with_alias {
            self.push(&format!(" {REL_ALIAS_PREFIX}{}", relation.rt_index));
        }
    }

    fn append_conditions(&mut self, conditions: &[Expr]) -> Result<(), FdwError> {
        for (i, cond) in conditions.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            if renders_parenthesized(cond) {
                self.append_expr(cond)?;
            } else {
                self.open_paren();
                self.append_expr(cond)?;
                self.close_paren();
            }
        }
        Ok(())
    }

    // ── Column references ──────────────────────────────────────────────

    fn append_column_ref(
        &mut self,
        rel_index: u32,
        attno: AttrNumber,
        qualify: bool,
    ) -> Result<(), FdwError> {
        match attno {
            SELF_ITEM_POINTER_ATTRIBUTE_NUMBER => {
                if qualify {
                    self.qualifier(rel_index);
                }
                self.push(ROW_IDENTIFIER);
            }
            n if n < 0 => {
                let value = if n == TABLE_OID_ATTRIBUTE_NUMBER {
                    self.relation.table_oid
                } else {
                    0
                };
                if qualify {
                    self.append_row_guard_start(rel_index);
                    self.push(&value.to_string());
                    self.push(" END");
                } else {
                    self.push(&value.to_string());
                }
            }
            0 => {
                if qualify {
                    self.append_row_guard_start(rel_index);
                }
                self.push("ROW");
                self.open_paren();
                self.append_target_list(true, qualify)?;
                self.close_paren();
                if qualify {
                    self.push(" END");
                }
            }
            _ => {
                let relation = self.relation;
                let column = relation.column(attno).ok_or(FdwError::CatalogLookup {
                    kind: "attribute",
                    oid: relation.table_oid,
                })?;
                let name = self
                    .oracle
                    .column_name_override(relation.table_oid, attno)
                    .unwrap_or_else(|| column.name.clone());
                if qualify {
                    self.qualifier(rel_index);
                }
                self.push(&quote_ident(&name));
            }
        }
        Ok(())
    }

    /// `CASE WHEN (r<n>.*)::text IS NOT NULL THEN `
    fn append_row_guard_start(&mut self, rel_index: u32) {
        self.push("CASE WHEN ");
        self.open_paren();
        self.qualifier(rel_index);
        self.push("*");
        self.close_paren();
        self.push("::text IS NOT NULL THEN ");
    }

    // ── Expressions ────────────────────────────────────────────────────

    /// Render one expression node and its children.
    pub fn append_expr(&mut self, expr: &Expr) -> Result<(), FdwError> {
        match expr {
            Expr::Var(var) => self.append_var(var),
            Expr::Const(c) => self.append_const(c),
            Expr::Param(param) => {
                self.append_param(param);
                Ok(())
            }
            Expr::FuncExpr(func) if func.format == FuncFormat::ImplicitCast => {
                // The remote side applies its own implicit conversion.
                self.append_list(&func.args, ", ")
            }
            Expr::FuncExpr(func) => {
                let info = lookup_function(self.oracle, func.func_oid)?;
                self.push(&info.name);
                self.open_paren();
                self.append_list(&func.args, ", ")?;
                self.close_paren();
                Ok(())
            }
            Expr::OpExpr(op) => self.append_operator(op),
            Expr::DistinctExpr(op) => self.append_distinct(op),
            Expr::BoolExpr(b) => {
                let Some(first) = b.args.first() else {
                    return Err(FdwError::InternalError(
                        "boolean expression without arguments".into(),
                    ));
                };
                self.open_paren();
                match b.op {
                    BoolExprType::And => self.append_list(&b.args, " AND ")?,
                    BoolExprType::Or => self.append_list(&b.args, " OR ")?,
                    BoolExprType::Not => {
                        self.push("NOT ");
                        self.append_expr(first)?;
                    }
                }
                self.close_paren();
                Ok(())
            }
            Expr::NullTest(nt) => {
                self.open_paren();
                self.append_expr(&nt.arg)?;
                self.push(match nt.test {
                    NullTestType::IsNull => " IS NULL",
                    NullTestType::IsNotNull => " IS NOT NULL",
                });
                self.close_paren();
                Ok(())
            }
            Expr::ArrayExpr(_) | Expr::List(_) | Expr::Aggref(_) | Expr::Unsupported(_) => {
                Err(FdwError::UnsupportedExpression(expr.node_name().to_string()))
            }
        }
    }

    fn append_list(&mut self, exprs: &[Expr], separator: &str) -> Result<(), FdwError> {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.append_expr(expr)?;
        }
        Ok(())
    }

    fn append_var(&mut self, var: &Var) -> Result<(), FdwError> {
        if var.rel_index != self.relation.rt_index {
            return Err(FdwError::UnsupportedExpression(format!(
                "Var of range table entry {}",
                var.rel_index
            )));
        }
        let qualify = self.relation.qualify_columns();
        self.append_column_ref(var.rel_index, var.attno, qualify)
    }

    fn append_param(&mut self, param: &Param) {
        self.push("?");
        self.params.push(BindSlot::Param {
            kind: param.kind,
            id: param.id,
            type_oid: param.type_oid,
        });
    }

    fn append_const(&mut self, c: &Const) -> Result<(), FdwError> {
        if c.is_null() {
            self.push("NULL");
            return Ok(());
        }

        match (LiteralCategory::of_type(c.type_oid), &c.value) {
            (LiteralCategory::Numeric, value) => {
                literal::ensure_finite_number(value)?;
                let text = self.oracle.type_output(c.type_oid, value)?;
                self.push(&text);
            }
            (LiteralCategory::Date, Datum::Date(days)) => {
                let text = literal::date_literal(*days)?;
                self.append_wrapped(&text);
            }
            (LiteralCategory::Timestamp, Datum::Timestamp(micros)) => {
                let text = literal::timestamp_literal(*micros)?;
                self.append_wrapped(&text);
            }
            (
                LiteralCategory::TimestampTz,
                Datum::TimestampTz {
                    utc_micros,
                    utc_offset_secs,
                },
            ) => {
                let text = literal::timestamptz_literal(*utc_micros, *utc_offset_secs)?;
                self.append_wrapped(&text);
            }
            (LiteralCategory::Interval, Datum::Interval(iv)) => {
                let text = literal::interval_literal(iv)?;
                self.push(&text);
            }
            (LiteralCategory::String, value) => {
                let text = self.oracle.type_output(c.type_oid, value)?;
                if text.is_empty() {
                    self.push("NULL");
                } else {
                    self.push(&literal::quote_literal(&text));
                }
            }
            (LiteralCategory::Other, value) => {
                let text = self.oracle.type_output(c.type_oid, value)?;
                self.push(&literal::quote_literal(&text));
            }
            (category, value) => {
                return Err(FdwError::InternalError(format!(
                    "constant of type {} ({category:?}) holds {value:?}",
                    c.type_oid
                )));
            }
        }
        Ok(())
    }

    /// Literal conversion calls are emitted inside their own parentheses.
    fn append_wrapped(&mut self, text: &str) {
        self.open_paren();
        self.push(text);
        self.close_paren();
    }

    fn append_operator(&mut self, op: &OpExpr) -> Result<(), FdwError> {
        let info = lookup_operator(self.oracle, op.op_oid)?;
        let expected = info.kind.arity();
        if op.args.len() != expected {
            return Err(FdwError::ArityMismatch {
                oid: op.op_oid,
                expected,
                actual: op.args.len(),
            });
        }
        let name = remote_operator_name(&info.name);

        self.open_paren();
        match (info.kind, op.args.as_slice()) {
            (OperatorKind::Binary, [lhs, rhs]) => {
                self.append_expr(lhs)?;
                self.push(" ");
                self.push(name);
                self.push(" ");
                self.append_expr(rhs)?;
            }
            (OperatorKind::Prefix, [arg]) => {
                self.push(name);
                self.push(" ");
                self.append_expr(arg)?;
            }
            _ => {
                return Err(FdwError::ArityMismatch {
                    oid: op.op_oid,
                    expected,
                    actual: op.args.len(),
                });
            }
        }
        self.close_paren();
        Ok(())
    }

    /// `a IS DISTINCT FROM b` as `DECODE(a, b, 0, 1) = 1`; `DECODE`
    /// treats two NULLs as equal.
    fn append_distinct(&mut self, op: &OpExpr) -> Result<(), FdwError> {
        let [lhs, rhs] = op.args.as_slice() else {
            return Err(FdwError::ArityMismatch {
                oid: op.op_oid,
                expected: 2,
                actual: op.args.len(),
            });
        };
        self.open_paren();
        self.push("DECODE");
        self.open_paren();
        self.append_expr(lhs)?;
        self.push(", ");
        self.append_expr(rhs)?;
        self.push(", 0, 1");
        self.close_paren();
        self.push(" = 1");
        self.close_paren();
        Ok(())
    }
}

/// Whether `expr` renders inside its own outer parentheses.
fn renders_parenthesized(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::OpExpr(_) | Expr::DistinctExpr(_) | Expr::BoolExpr(_) | Expr::NullTest(_)
    )
}

/// Render the SELECT statement for a scan of `relation` with the given
/// remote conditions.
pub fn render_select(
    relation: &ForeignRelation,
    remote_conds: &[Expr],
    use_fb_query: bool,
    oracle: &dyn MetadataOracle,
) -> Result<DeparsedSelect, FdwError> {
    let qualify = relation.qualify_columns();
    let mut cx = DeparseContext::new(relation, oracle, use_fb_query);

    cx.push("SELECT ");
    let retrieved_attrs = cx.append_target_list(false, qualify)?;
    if retrieved_attrs.is_empty() {
        cx.push("NULL");
    }

    cx.push(" FROM ");
    cx.append_relation(true, qualify);

    if !remote_conds.is_empty() {
        cx.push(" WHERE ");
        cx.append_conditions(remote_conds)?;
    }

    let (sql, params) = cx.finish()?;
    debug!(
        relation = %relation.relation_name,
        sql = %sql,
        params = params.len(),
        "deparsed remote query"
    );
    Ok(DeparsedSelect {
        sql,
        retrieved_attrs,
        params,
    })
}

/// Render a parameterized INSERT of `target_attrs`, one `?` per column.
pub fn render_insert(
    relation: &ForeignRelation,
    target_attrs: &[AttrNumber],
    oracle: &dyn MetadataOracle,
) -> Result<String, FdwError> {
    let mut cx = DeparseContext::new(relation, oracle, false);

    cx.push("INSERT INTO ");
    cx.append_relation(false, false);

    if !target_attrs.is_empty() {
        cx.push(" ");
        cx.open_paren();
        for (i, &attno) in target_attrs.iter().enumerate() {
            if i > 0 {
                cx.push(", ");
            }
            if attno <= 0 {
                return Err(FdwError::InternalError(format!(
                    "cannot insert into system attribute {attno}"
                )));
            }
            cx.append_column_ref(relation.rt_index, attno, false)?;
        }
        cx.close_paren();
        cx.push(" VALUES ");
        cx.open_paren();
        cx.push(&vec!["?"; target_attrs.len()].join(", "));
        cx.close_paren();
    } else {
        cx.push(" DEFAULT VALUES");
    }

    let (sql, _) = cx.finish()?;
    debug!(relation = %relation.relation_name, sql = %sql, "deparsed remote insert");
    Ok(sql)
}
