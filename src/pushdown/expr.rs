//! Expression tree representation for candidate pushdown conditions.
//!
//! The planner hands the FDW analyzed expression trees (`Var`, `OpExpr`,
//! `FuncExpr`, ...). They are mirrored here as a closed enum so that the
//! classifier and the deparser can both `match` exhaustively: adding a node
//! kind forces both walkers to be updated.
//!
//! Field names follow the PostgreSQL node fields they come from, minus the
//! node prefix (`varattno` → `attno`, `opcollid` → `collation`).

use serde::{Deserialize, Serialize};

/// PostgreSQL object identifier.
pub type Oid = u32;

/// Column ordinal. Negative values are system columns, `0` is the whole row.
pub type AttrNumber = i16;

/// `DEFAULT_COLLATION_OID` from `pg_collation.h`.
pub const DEFAULT_COLLATION_OID: Oid = 100;

/// Objects below this oid were created by `initdb` (`FirstGenbkiObjectId`).
pub const FIRST_GENBKI_OBJECT_ID: Oid = 10000;

/// `ctid`, rendered remotely as the row identifier pseudo-column.
pub const SELF_ITEM_POINTER_ATTRIBUTE_NUMBER: AttrNumber = -1;

/// `tableoid` system column.
pub const TABLE_OID_ATTRIBUTE_NUMBER: AttrNumber = -6;

/// Built-in type oids the deparser dispatches on (`pg_type_d.h`).
pub mod pg_type {
    use super::Oid;

    pub const BOOLOID: Oid = 16;
    pub const CHAROID: Oid = 18;
    pub const NAMEOID: Oid = 19;
    pub const INT8OID: Oid = 20;
    pub const INT2OID: Oid = 21;
    pub const INT4OID: Oid = 23;
    pub const TEXTOID: Oid = 25;
    pub const OIDOID: Oid = 26;
    pub const FLOAT4OID: Oid = 700;
    pub const FLOAT8OID: Oid = 701;
    pub const BPCHAROID: Oid = 1042;
    pub const VARCHAROID: Oid = 1043;
    pub const DATEOID: Oid = 1082;
    pub const TIMESTAMPOID: Oid = 1114;
    pub const TIMESTAMPTZOID: Oid = 1184;
    pub const INTERVALOID: Oid = 1186;
    pub const NUMERICOID: Oid = 1700;
    pub const UUIDOID: Oid = 2950;
    pub const INT4ARRAYOID: Oid = 1007;
}

/// A constant's value, decoded from its PostgreSQL datum.
///
/// Date and timestamp values keep PostgreSQL's on-disk encoding (offsets
/// from 2000-01-01) so that the infinities survive the trip: `i32::MIN` /
/// `i32::MAX` for dates and `i64::MIN` / `i64::MAX` for timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// `float4`, kept at single precision so it prints as PostgreSQL does.
    Float4(f32),
    /// `numeric` in its canonical text form.
    Numeric(String),
    Text(String),
    Uuid(String),
    /// Days since 2000-01-01.
    Date(i32),
    /// Microseconds since 2000-01-01 00:00:00.
    Timestamp(i64),
    /// Microseconds since 2000-01-01 00:00:00 UTC, displayed at `utc_offset_secs`.
    TimestampTz { utc_micros: i64, utc_offset_secs: i32 },
    Interval(Interval),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }
}

/// `interval` as PostgreSQL stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub micros: i64,
}

/// A column reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    /// Range-table index of the row source the column belongs to.
    pub rel_index: u32,
    pub attno: AttrNumber,
    pub type_oid: Oid,
    pub collation: Option<Oid>,
    /// Number of query levels up (non-zero for outer references).
    pub levels_up: u32,
}

impl Var {
    /// A plain column of `rel_index` with no collation.
    pub fn column(rel_index: u32, attno: AttrNumber, type_oid: Oid) -> Self {
        Var {
            rel_index,
            attno,
            type_oid,
            collation: None,
            levels_up: 0,
        }
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub type_oid: Oid,
    pub collation: Option<Oid>,
    pub value: Datum,
}

impl Const {
    pub fn new(type_oid: Oid, value: Datum) -> Self {
        Const {
            type_oid,
            collation: None,
            value,
        }
    }

    pub fn null(type_oid: Oid) -> Self {
        Const::new(type_oid, Datum::Null)
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }
}

/// Where a parameter's value comes from (`ParamKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    Extern,
    Exec,
    Sublink,
    /// Destructures one column of a multi-column sub-select; has no
    /// single-placeholder remote equivalent.
    MultiExpr,
}

/// A query parameter (`$1`, or an executor-supplied value).
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub kind: ParamKind,
    pub id: i32,
    pub type_oid: Oid,
    pub collation: Option<Oid>,
}

/// How a function call appeared in the query (`CoercionForm`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncFormat {
    /// `name(args)`, including SQL-syntax forms such as `EXTRACT`.
    Call,
    /// `CAST(x AS t)` or `x::t` written by the user.
    ExplicitCast,
    /// A coercion the planner inserted.
    ImplicitCast,
}

/// A function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncExpr {
    pub func_oid: Oid,
    pub result_type: Oid,
    pub format: FuncFormat,
    /// Collation of the result.
    pub collation: Option<Oid>,
    /// Collation the function uses for its inputs.
    pub input_collation: Option<Oid>,
    pub args: Vec<Expr>,
}

/// An operator invocation. Also used for `IS DISTINCT FROM`.
#[derive(Debug, Clone, PartialEq)]
pub struct OpExpr {
    pub op_oid: Oid,
    pub result_type: Oid,
    pub collation: Option<Oid>,
    pub input_collation: Option<Oid>,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolExprType {
    And,
    Or,
    Not,
}

/// `AND` / `OR` / `NOT`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoolExpr {
    pub op: BoolExprType,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullTestType {
    IsNull,
    IsNotNull,
}

/// `arg IS [NOT] NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct NullTest {
    pub arg: Box<Expr>,
    pub test: NullTestType,
}

/// `ARRAY[...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpr {
    pub array_type: Oid,
    pub element_type: Oid,
    pub collation: Option<Oid>,
    pub elements: Vec<Expr>,
}

/// How an aggregate is split between partial and final evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggSplit {
    Simple,
    InitialSerial,
    FinalDeserial,
}

/// An aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggref {
    pub agg_oid: Oid,
    pub result_type: Oid,
    pub collation: Option<Oid>,
    pub input_collation: Option<Oid>,
    pub args: Vec<Expr>,
    pub split: AggSplit,
}

/// An analyzed expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    Const(Const),
    Param(Param),
    FuncExpr(FuncExpr),
    OpExpr(OpExpr),
    DistinctExpr(OpExpr),
    BoolExpr(BoolExpr),
    NullTest(NullTest),
    ArrayExpr(ArrayExpr),
    /// A bare list of expressions (e.g. an argument list).
    List(Vec<Expr>),
    Aggref(Aggref),
    /// Any other planner node; carries the node tag name for diagnostics.
    Unsupported(String),
}

impl Expr {
    /// The PostgreSQL node tag name, for logs and error messages.
    pub fn node_name(&self) -> &str {
        match self {
            Expr::Var(_) => "Var",
            Expr::Const(_) => "Const",
            Expr::Param(_) => "Param",
            Expr::FuncExpr(_) => "FuncExpr",
            Expr::OpExpr(_) => "OpExpr",
            Expr::DistinctExpr(_) => "DistinctExpr",
            Expr::BoolExpr(_) => "BoolExpr",
            Expr::NullTest(_) => "NullTest",
            Expr::ArrayExpr(_) => "ArrayExpr",
            Expr::List(_) => "List",
            Expr::Aggref(_) => "Aggref",
            Expr::Unsupported(tag) => tag,
        }
    }

    /// `left AND right AND ...`
    pub fn and(args: Vec<Expr>) -> Expr {
        Expr::BoolExpr(BoolExpr {
            op: BoolExprType::And,
            args,
        })
    }

    /// `left OR right OR ...`
    pub fn or(args: Vec<Expr>) -> Expr {
        Expr::BoolExpr(BoolExpr {
            op: BoolExprType::Or,
            args,
        })
    }

    /// `NOT arg`
    pub fn not(arg: Expr) -> Expr {
        Expr::BoolExpr(BoolExpr {
            op: BoolExprType::Not,
            args: vec![arg],
        })
    }

    /// Binary operator call with no collations.
    pub fn binary_op(op_oid: Oid, left: Expr, right: Expr) -> Expr {
        Expr::OpExpr(OpExpr {
            op_oid,
            result_type: pg_type::BOOLOID,
            collation: None,
            input_collation: None,
            args: vec![left, right],
        })
    }

    /// Collect every `Var` in the tree, depth-first, left to right.
    pub fn vars(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Expr::Var(var) => out.push(var),
            Expr::Const(_) | Expr::Param(_) | Expr::Unsupported(_) => {}
            Expr::FuncExpr(f) => f.args.iter().for_each(|a| a.collect_vars(out)),
            Expr::OpExpr(op) | Expr::DistinctExpr(op) => {
                op.args.iter().for_each(|a| a.collect_vars(out))
            }
            Expr::BoolExpr(b) => b.args.iter().for_each(|a| a.collect_vars(out)),
            Expr::NullTest(n) => n.arg.collect_vars(out),
            Expr::ArrayExpr(a) => a.elements.iter().for_each(|e| e.collect_vars(out)),
            Expr::List(items) => items.iter().for_each(|e| e.collect_vars(out)),
            Expr::Aggref(agg) => agg.args.iter().for_each(|a| a.collect_vars(out)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_names() {
        assert_eq!(Expr::Var(Var::column(1, 1, pg_type::INT4OID)).node_name(), "Var");
        assert_eq!(Expr::List(vec![]).node_name(), "List");
        assert_eq!(Expr::Unsupported("SubLink".into()).node_name(), "SubLink");
    }

    #[test]
    fn test_const_null() {
        assert!(Const::null(pg_type::TEXTOID).is_null());
        assert!(!Const::new(pg_type::INT4OID, Datum::Int(0)).is_null());
    }

    #[test]
    fn test_vars_in_order() {
        let expr = Expr::and(vec![
            Expr::binary_op(
                96,
                Expr::Var(Var::column(1, 2, pg_type::INT4OID)),
                Expr::Const(Const::new(pg_type::INT4OID, Datum::Int(1))),
            ),
            Expr::NullTest(NullTest {
                arg: Box::new(Expr::Var(Var::column(1, 5, pg_type::TEXTOID))),
                test: NullTestType::IsNotNull,
            }),
        ]);
        let attnos: Vec<AttrNumber> = expr.vars().iter().map(|v| v.attno).collect();
        assert_eq!(attnos, vec![2, 5]);
    }
}
