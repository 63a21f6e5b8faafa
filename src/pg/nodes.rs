//! Conversion of planner expression nodes into [`Expr`] trees.
//!
//! Node kinds the pushdown core has no variant for become
//! [`Expr::Unsupported`] carrying the node tag, so the classifier rejects
//! them instead of the conversion failing.

use std::ffi::CStr;

use pgrx::{PgList, is_a, pg_sys};

use crate::error::FdwError;
use crate::pushdown::expr::{
    AggSplit, Aggref, ArrayExpr, BoolExpr, BoolExprType, Const, Datum, Expr, FuncExpr, FuncFormat,
    Interval, NullTest, NullTestType, OpExpr, Oid, Param, ParamKind, Var, pg_type,
};

fn collation(oid: pg_sys::Oid) -> Option<Oid> {
    let raw = oid.to_u32();
    (raw != 0).then_some(raw)
}

/// Convert a `List` of expressions (or `RestrictInfo`s).
///
/// # Safety
/// `list` must be null or a valid `List` of expression nodes.
pub unsafe fn convert_list(list: *mut pg_sys::List) -> Result<Vec<Expr>, FdwError> {
    // SAFETY: caller guarantees a List of nodes (or NIL).
    let items = unsafe { PgList::<pg_sys::Node>::from_pg(list) };
    items
        .iter_ptr()
        // SAFETY: every element is a valid node.
        .map(|node| unsafe { convert_node(node) })
        .collect()
}

/// Convert one expression node.
///
/// # Safety
/// `node` must be a valid, non-null planner node.
pub unsafe fn convert_node(node: *mut pg_sys::Node) -> Result<Expr, FdwError> {
    if node.is_null() {
        return Err(FdwError::InternalError("null expression node".into()));
    }

    // SAFETY: `node` is valid; each cast below follows a tag check.
    unsafe {
        if is_a(node, pg_sys::NodeTag::T_RestrictInfo) {
            let rinfo = &*(node as *const pg_sys::RestrictInfo);
            return convert_node(rinfo.clause as *mut pg_sys::Node);
        }
        if is_a(node, pg_sys::NodeTag::T_Var) {
            let var = &*(node as *const pg_sys::Var);
            return Ok(Expr::Var(Var {
                rel_index: u32::try_from(var.varno).unwrap_or(0),
                attno: var.varattno,
                type_oid: var.vartype.to_u32(),
                collation: collation(var.varcollid),
                levels_up: var.varlevelsup,
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_Const) {
            let c = &*(node as *const pg_sys::Const);
            return convert_const(c).map(Expr::Const);
        }
        if is_a(node, pg_sys::NodeTag::T_Param) {
            let p = &*(node as *const pg_sys::Param);
            let kind = match p.paramkind {
                pg_sys::ParamKind::PARAM_EXTERN => ParamKind::Extern,
                pg_sys::ParamKind::PARAM_EXEC => ParamKind::Exec,
                pg_sys::ParamKind::PARAM_SUBLINK => ParamKind::Sublink,
                _ => ParamKind::MultiExpr,
            };
            return Ok(Expr::Param(Param {
                kind,
                id: p.paramid,
                type_oid: p.paramtype.to_u32(),
                collation: collation(p.paramcollid),
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_FuncExpr) {
            let f = &*(node as *const pg_sys::FuncExpr);
            let format = match f.funcformat {
                pg_sys::CoercionForm::COERCE_EXPLICIT_CAST => FuncFormat::ExplicitCast,
                pg_sys::CoercionForm::COERCE_IMPLICIT_CAST => FuncFormat::ImplicitCast,
                _ => FuncFormat::Call,
            };
            return Ok(Expr::FuncExpr(FuncExpr {
                func_oid: f.funcid.to_u32(),
                result_type: f.funcresulttype.to_u32(),
                format,
                collation: collation(f.funccollid),
                input_collation: collation(f.inputcollid),
                args: convert_list(f.args)?,
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_OpExpr) || is_a(node, pg_sys::NodeTag::T_DistinctExpr) {
            let o = &*(node as *const pg_sys::OpExpr);
            let op = OpExpr {
                op_oid: o.opno.to_u32(),
                result_type: o.opresulttype.to_u32(),
                collation: collation(o.opcollid),
                input_collation: collation(o.inputcollid),
                args: convert_list(o.args)?,
            };
            return Ok(if is_a(node, pg_sys::NodeTag::T_DistinctExpr) {
                Expr::DistinctExpr(op)
            } else {
                Expr::OpExpr(op)
            });
        }
        if is_a(node, pg_sys::NodeTag::T_BoolExpr) {
            let b = &*(node as *const pg_sys::BoolExpr);
            let op = match b.boolop {
                pg_sys::BoolExprType::AND_EXPR => BoolExprType::And,
                pg_sys::BoolExprType::OR_EXPR => BoolExprType::Or,
                _ => BoolExprType::Not,
            };
            return Ok(Expr::BoolExpr(BoolExpr {
                op,
                args: convert_list(b.args)?,
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_NullTest) {
            let nt = &*(node as *const pg_sys::NullTest);
            if nt.argisrow {
                return Ok(Expr::Unsupported("NullTest(row)".into()));
            }
            let test = if nt.nulltesttype == pg_sys::NullTestType::IS_NULL {
                NullTestType::IsNull
            } else {
                NullTestType::IsNotNull
            };
            return Ok(Expr::NullTest(NullTest {
                arg: Box::new(convert_node(nt.arg as *mut pg_sys::Node)?),
                test,
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_ArrayExpr) {
            let a = &*(node as *const pg_sys::ArrayExpr);
            return Ok(Expr::ArrayExpr(ArrayExpr {
                array_type: a.array_typeid.to_u32(),
                element_type: a.element_typeid.to_u32(),
                collation: collation(a.array_collid),
                elements: convert_list(a.elements)?,
            }));
        }
        if is_a(node, pg_sys::NodeTag::T_List) {
            return convert_list(node as *mut pg_sys::List).map(Expr::List);
        }
        if is_a(node, pg_sys::NodeTag::T_Aggref) {
            let a = &*(node as *const pg_sys::Aggref);
            let split = match a.aggsplit {
                pg_sys::AggSplit::AGGSPLIT_SIMPLE => AggSplit::Simple,
                pg_sys::AggSplit::AGGSPLIT_INITIAL_SERIAL => AggSplit::InitialSerial,
                _ => AggSplit::FinalDeserial,
            };
            return Ok(Expr::Aggref(Aggref {
                agg_oid: a.aggfnoid.to_u32(),
                result_type: a.aggtype.to_u32(),
                collation: collation(a.aggcollid),
                input_collation: collation(a.inputcollid),
                args: convert_list(a.args)?,
                split,
            }));
        }

        Ok(Expr::Unsupported(format!("{:?}", (*node).type_)))
    }
}

/// Text produced by the type's output function.
///
/// # Safety
/// `value` must be a valid, non-null datum of type `type_oid`.
unsafe fn output_text(type_oid: pg_sys::Oid, value: pg_sys::Datum) -> String {
    let mut out_func = pg_sys::InvalidOid;
    let mut is_varlena = false;
    // SAFETY: the type exists (the planner built a Const of it) and the
    // output function returns a palloc'd C string.
    unsafe {
        pg_sys::getTypeOutputInfo(type_oid, &mut out_func, &mut is_varlena);
        let text = pg_sys::OidOutputFunctionCall(out_func, value);
        CStr::from_ptr(text).to_string_lossy().into_owned()
    }
}

/// Decode a constant's datum.
///
/// # Safety
/// `c` must be a valid `Const` node.
unsafe fn convert_const(c: &pg_sys::Const) -> Result<Const, FdwError> {
    let type_oid = c.consttype.to_u32();
    let collation = collation(c.constcollid);
    if c.constisnull {
        return Ok(Const {
            type_oid,
            collation,
            value: Datum::Null,
        });
    }

    let raw = c.constvalue;
    // SAFETY: non-null by-value types are read straight from the datum;
    // by-reference types go through their output function.
    let value = unsafe {
        match type_oid {
            pg_type::BOOLOID => Datum::Bool(raw.value() != 0),
            pg_type::INT2OID => Datum::Int(i64::from(raw.value() as i16)),
            pg_type::INT4OID => Datum::Int(i64::from(raw.value() as i32)),
            pg_type::INT8OID => Datum::Int(raw.value() as i64),
            pg_type::OIDOID => Datum::Int(i64::from(raw.value() as u32)),
            pg_type::FLOAT4OID => Datum::Float4(f32::from_bits(raw.value() as u32)),
            pg_type::FLOAT8OID => Datum::Float(f64::from_bits(raw.value() as u64)),
            pg_type::NUMERICOID => Datum::Numeric(output_text(c.consttype, raw)),
            pg_type::UUIDOID => Datum::Uuid(output_text(c.consttype, raw)),
            pg_type::DATEOID => Datum::Date(raw.value() as i32),
            pg_type::TIMESTAMPOID => Datum::Timestamp(raw.value() as i64),
            pg_type::TIMESTAMPTZOID => {
                let utc_micros = raw.value() as i64;
                Datum::TimestampTz {
                    utc_micros,
                    utc_offset_secs: session_utc_offset(utc_micros),
                }
            }
            pg_type::INTERVALOID => {
                let iv = &*(raw.cast_mut_ptr::<pg_sys::Interval>());
                Datum::Interval(Interval {
                    months: iv.month,
                    days: iv.day,
                    micros: iv.time,
                })
            }
            _ => Datum::Text(output_text(c.consttype, raw)),
        }
    };

    Ok(Const {
        type_oid,
        collation,
        value,
    })
}

/// UTC offset, in seconds east, of the session time zone at `utc_micros`.
fn session_utc_offset(utc_micros: i64) -> i32 {
    if utc_micros == i64::MIN || utc_micros == i64::MAX {
        return 0;
    }
    let mut tz: i32 = 0;
    // SAFETY: zeroed pg_tm is a valid out-parameter; a null zone selects the
    // session time zone.
    let rc = unsafe {
        let mut tm: pg_sys::pg_tm = std::mem::zeroed();
        let mut fsec: pg_sys::fsec_t = 0;
        pg_sys::timestamp2tm(
            utc_micros,
            &mut tz,
            &mut tm,
            &mut fsec,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    // timestamp2tm reports seconds west of UTC.
    if rc == 0 { -tz } else { 0 }
}
