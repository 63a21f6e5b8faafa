//! Shared test helpers for pushdown unit tests.
//!
//! Builders for expression nodes over a sample foreign table, plus a
//! catalog that knows the table's remote location. Nothing here touches
//! PostgreSQL.

use crate::pushdown::catalog::StaticCatalog;
use crate::pushdown::catalog::builtin::{COUNT_STAR, INT4_EQ};
use crate::pushdown::expr::{
    AggSplit, Aggref, ArrayExpr, AttrNumber, Const, DEFAULT_COLLATION_OID, Datum, Expr, FuncExpr,
    FuncFormat, NullTest, NullTestType, Oid, Param, ParamKind, Var, pg_type,
};
use crate::pushdown::relation::ForeignRelation;

pub const SAMPLE_TABLE_OID: Oid = 16_384;
pub const C_COLLATION: Oid = 950;
pub const POSIX_COLLATION: Oid = 951;
/// 2023-03-15 as days since 2000-01-01.
pub const DAY_2023_03_15: i32 = 8_474;

// ── Relation and catalog ────────────────────────────────────────────────

const SAMPLE_COLUMNS: &[(&str, Oid)] = &[
    ("id", pg_type::INT4OID),
    ("name", pg_type::TEXTOID),
    ("created_on", pg_type::DATEOID),
    ("updated_at", pg_type::TIMESTAMPTZOID),
    ("price", pg_type::NUMERICOID),
    ("active", pg_type::BOOLOID),
];

/// `mytable(id, name, created_on, updated_at, price, active)` at range-table
/// index 1, with `id` and `name` in the target list.
pub fn sample_relation() -> ForeignRelation {
    SAMPLE_COLUMNS
        .iter()
        .fold(
            ForeignRelation::new(SAMPLE_TABLE_OID, "mytable", 1),
            |rel, (name, type_oid)| rel.with_column(name, *type_oid),
        )
        .using(&[1, 2])
}

/// Built-in catalog with `mytable` mapped to `"schema"."mytable"`.
pub fn sample_catalog() -> StaticCatalog {
    StaticCatalog::new().with_table_location(SAMPLE_TABLE_OID, Some("schema"), Some("mytable"))
}

// ── Expression builders ─────────────────────────────────────────────────

fn sample_type(attno: AttrNumber) -> Oid {
    usize::try_from(attno - 1)
        .ok()
        .and_then(|i| SAMPLE_COLUMNS.get(i))
        .map_or(pg_type::INT4OID, |(_, t)| *t)
}

/// Column `attno` of the sample relation. Text columns carry the default
/// collation, as the planner would assign.
pub fn col(attno: AttrNumber) -> Expr {
    let type_oid = sample_type(attno);
    let mut var = Var::column(1, attno, type_oid);
    if type_oid == pg_type::TEXTOID {
        var.collation = Some(DEFAULT_COLLATION_OID);
    }
    Expr::Var(var)
}

/// Text column `attno` with an explicit collation.
pub fn text_col_collated(attno: AttrNumber, collation: Oid) -> Expr {
    let mut var = Var::column(1, attno, pg_type::TEXTOID);
    var.collation = Some(collation);
    Expr::Var(var)
}

pub fn row_id() -> Expr {
    Expr::Var(Var::column(1, -1, pg_type::TEXTOID))
}

pub fn whole_row() -> Expr {
    Expr::Var(Var::column(1, 0, 16_386))
}

pub fn int4(v: i32) -> Expr {
    Expr::Const(Const::new(pg_type::INT4OID, Datum::Int(i64::from(v))))
}

pub fn float8(v: f64) -> Expr {
    Expr::Const(Const::new(pg_type::FLOAT8OID, Datum::Float(v)))
}

pub fn numeric(v: &str) -> Expr {
    Expr::Const(Const::new(pg_type::NUMERICOID, Datum::Numeric(v.to_string())))
}

pub fn text(v: &str) -> Expr {
    text_collated(v, DEFAULT_COLLATION_OID)
}

pub fn text_collated(v: &str, collation: Oid) -> Expr {
    Expr::Const(Const {
        type_oid: pg_type::TEXTOID,
        collation: Some(collation),
        value: Datum::Text(v.to_string()),
    })
}

pub fn date(days: i32) -> Expr {
    Expr::Const(Const::new(pg_type::DATEOID, Datum::Date(days)))
}

pub fn param(kind: ParamKind, id: i32) -> Expr {
    Expr::Param(Param {
        kind,
        id,
        type_oid: pg_type::INT4OID,
        collation: None,
    })
}

/// `int4 = int4`
pub fn eq(left: Expr, right: Expr) -> Expr {
    Expr::binary_op(INT4_EQ, left, right)
}

pub fn func(func_oid: Oid, args: Vec<Expr>) -> Expr {
    Expr::FuncExpr(FuncExpr {
        func_oid,
        result_type: pg_type::FLOAT8OID,
        format: FuncFormat::Call,
        collation: None,
        input_collation: None,
        args,
    })
}

/// A planner-inserted coercion of `arg` through `func_oid`.
pub fn implicit_cast(func_oid: Oid, result_type: Oid, arg: Expr) -> Expr {
    Expr::FuncExpr(FuncExpr {
        func_oid,
        result_type,
        format: FuncFormat::ImplicitCast,
        collation: None,
        input_collation: None,
        args: vec![arg],
    })
}

pub fn is_null(arg: Expr) -> Expr {
    Expr::NullTest(NullTest {
        arg: Box::new(arg),
        test: NullTestType::IsNull,
    })
}

pub fn int4_array(elements: Vec<Expr>) -> Expr {
    Expr::ArrayExpr(ArrayExpr {
        array_type: pg_type::INT4ARRAYOID,
        element_type: pg_type::INT4OID,
        collation: None,
        elements,
    })
}

pub fn aggregate(agg_oid: Oid, args: Vec<Expr>) -> Expr {
    Expr::Aggref(Aggref {
        agg_oid,
        result_type: pg_type::INT8OID,
        collation: None,
        input_collation: None,
        args,
        split: AggSplit::Simple,
    })
}

/// `count(*)`
pub fn count_star() -> Expr {
    aggregate(COUNT_STAR, vec![])
}
