//! `FdwRoutine` for tibero_fdw foreign tables.
//!
//! Planning is complete: size estimate, one foreign path costed from the
//! table options, and a `ForeignScan` whose private list carries the
//! rendered remote query. The executor callbacks keep that plan for
//! EXPLAIN; fetching rows from a remote server is not part of this crate.

use std::ffi::{CStr, c_int, c_void};
use std::ptr;

use pgrx::memcxt::PgMemoryContexts;
use pgrx::{AllocatedByRust, PgBox, PgList, pg_guard, pg_sys};

use super::{nodes, raise, relation_options};
use crate::error::FdwError;
use crate::pushdown::ForeignScanPlan;

/// Size of a heap tuple header, rounded up to the platform alignment.
const TUPLE_HEADER_SIZE: f64 = 24.0;

/// Executor state of one foreign scan.
struct ScanState {
    plan: ForeignScanPlan,
}

fn ok_or_raise<T>(result: Result<T, FdwError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => raise(e),
    }
}

// ── Handler ─────────────────────────────────────────────────────────────────

#[unsafe(no_mangle)]
#[doc(hidden)]
pub extern "C" fn pg_finfo_tibero_fdw_handler() -> &'static pg_sys::Pg_finfo_record {
    const V1_API: pg_sys::Pg_finfo_record = pg_sys::Pg_finfo_record { api_version: 1 };
    &V1_API
}

/// `fdw_handler` function of the wrapper.
#[pg_guard]
#[unsafe(no_mangle)]
pub extern "C-unwind" fn tibero_fdw_handler(_fcinfo: pg_sys::FunctionCallInfo) -> pg_sys::Datum {
    let mut routine =
        PgBox::<pg_sys::FdwRoutine, AllocatedByRust>::alloc_node(pg_sys::NodeTag::T_FdwRoutine);

    routine.GetForeignRelSize = Some(get_foreign_rel_size);
    routine.GetForeignPaths = Some(get_foreign_paths);
    routine.GetForeignPlan = Some(get_foreign_plan);
    routine.BeginForeignScan = Some(begin_foreign_scan);
    routine.IterateForeignScan = Some(iterate_foreign_scan);
    routine.ReScanForeignScan = Some(re_scan_foreign_scan);
    routine.EndForeignScan = Some(end_foreign_scan);
    routine.ExplainForeignScan = Some(explain_foreign_scan);

    pg_sys::Datum::from(routine.into_pg())
}

// ── Planning ────────────────────────────────────────────────────────────────

#[pg_guard]
unsafe extern "C-unwind" fn get_foreign_rel_size(
    root: *mut pg_sys::PlannerInfo,
    baserel: *mut pg_sys::RelOptInfo,
    _foreigntableid: pg_sys::Oid,
) {
    // SAFETY: the planner passes valid `root` and `baserel` pointers.
    unsafe {
        // Never analyzed: assume ten pages of tuples of the target width.
        if (*baserel).tuples < 0.0 {
            let width = f64::from((*(*baserel).reltarget).width);
            (*baserel).pages = 10;
            (*baserel).tuples = (10.0 * f64::from(pg_sys::BLCKSZ)) / (width + TUPLE_HEADER_SIZE);
        }
        pg_sys::set_baserel_size_estimates(root, baserel);
    }
}

#[pg_guard]
unsafe extern "C-unwind" fn get_foreign_paths(
    root: *mut pg_sys::PlannerInfo,
    baserel: *mut pg_sys::RelOptInfo,
    foreigntableid: pg_sys::Oid,
) {
    let options = ok_or_raise(relation_options(foreigntableid));

    // SAFETY: the planner passes valid `root` and `baserel` pointers.
    unsafe {
        let rows = (*baserel).rows;
        let (startup_cost, total_cost) = options.scan_costs(rows);
        let path = pg_sys::create_foreignscan_path(
            root,
            baserel,
            ptr::null_mut(),
            rows,
            0,
            startup_cost,
            total_cost,
            ptr::null_mut(),
            (*baserel).lateral_relids,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        );
        pg_sys::add_path(baserel, path as *mut pg_sys::Path);
    }
}

#[pg_guard]
unsafe extern "C-unwind" fn get_foreign_plan(
    _root: *mut pg_sys::PlannerInfo,
    baserel: *mut pg_sys::RelOptInfo,
    foreigntableid: pg_sys::Oid,
    _best_path: *mut pg_sys::ForeignPath,
    tlist: *mut pg_sys::List,
    scan_clauses: *mut pg_sys::List,
    outer_plan: *mut pg_sys::Plan,
) -> *mut pg_sys::ForeignScan {
    // SAFETY: `scan_clauses` is the planner's RestrictInfo list for this
    // base relation.
    let rinfos = unsafe { PgList::<pg_sys::RestrictInfo>::from_pg(scan_clauses) };
    let rinfos: Vec<*mut pg_sys::RestrictInfo> = rinfos
        .iter_ptr()
        // SAFETY: every element is a valid RestrictInfo.
        .filter(|rinfo| unsafe { !(**rinfo).pseudoconstant })
        .collect();

    let clauses = ok_or_raise(
        rinfos
            .iter()
            // SAFETY: every element is a valid RestrictInfo.
            .map(|rinfo| unsafe { nodes::convert_node((**rinfo).clause as *mut pg_sys::Node) })
            .collect::<Result<Vec<_>, _>>(),
    );

    // SAFETY: `baserel` is the planner's RelOptInfo for `foreigntableid`.
    let planned = ok_or_raise(unsafe { super::plan_base_scan(baserel, foreigntableid, &clauses) });
    let plan_json = ok_or_raise(planned.plan.to_json());

    let mut local_exprs = PgList::<pg_sys::Expr>::new();
    let mut remote_exprs = PgList::<pg_sys::Expr>::new();
    for (rinfo, clause) in rinfos.iter().zip(&clauses) {
        // SAFETY: every element is a valid RestrictInfo.
        let expr = unsafe { (**rinfo).clause };
        if planned.remote_conds.contains(clause) {
            remote_exprs.push(expr);
        } else {
            local_exprs.push(expr);
        }
    }

    // SAFETY: all lists are freshly built in the planner's memory context.
    unsafe {
        let mut fdw_private = PgList::<pg_sys::Node>::new();
        let text = PgMemoryContexts::CurrentMemoryContext.pstrdup(&plan_json);
        fdw_private.push(pg_sys::makeString(text) as *mut pg_sys::Node);

        pg_sys::make_foreignscan(
            tlist,
            local_exprs.into_pg(),
            (*baserel).relid,
            ptr::null_mut(),
            fdw_private.into_pg(),
            ptr::null_mut(),
            remote_exprs.into_pg(),
            outer_plan,
        )
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

/// Decode the scan plan stored by [`get_foreign_plan`].
///
/// # Safety
/// `node` must be a valid `ForeignScanState` of a tibero_fdw scan.
unsafe fn stored_plan(node: *mut pg_sys::ForeignScanState) -> Result<ForeignScanPlan, FdwError> {
    // SAFETY: caller guarantees `node`; its plan is a ForeignScan whose
    // private list starts with the plan text.
    let text = unsafe {
        let scan = (*node).ss.ps.plan as *mut pg_sys::ForeignScan;
        let private = PgList::<pg_sys::Node>::from_pg((*scan).fdw_private);
        let Some(first) = private.get_ptr(0) else {
            return Err(FdwError::InternalError("foreign scan has no plan".into()));
        };
        let value = first as *mut pg_sys::String;
        CStr::from_ptr((*value).sval).to_string_lossy().into_owned()
    };
    ForeignScanPlan::from_json(&text)
}

#[pg_guard]
unsafe extern "C-unwind" fn begin_foreign_scan(node: *mut pg_sys::ForeignScanState, eflags: c_int) {
    // SAFETY: the executor passes the state of a tibero_fdw scan.
    let plan = ok_or_raise(unsafe { stored_plan(node) });
    let explain_only = eflags & pg_sys::EXEC_FLAG_EXPLAIN_ONLY as c_int != 0;
    tracing::debug!(sql = %plan.sql, explain_only, "begin foreign scan");

    let state = Box::into_raw(Box::new(ScanState { plan }));
    // SAFETY: `node` is valid; the state is released in `end_foreign_scan`.
    unsafe {
        (*node).fdw_state = state as *mut c_void;
    }
}

#[pg_guard]
unsafe extern "C-unwind" fn iterate_foreign_scan(
    _node: *mut pg_sys::ForeignScanState,
) -> *mut pg_sys::TupleTableSlot {
    pgrx::error!("tibero_fdw: remote query execution is not available")
}

#[pg_guard]
unsafe extern "C-unwind" fn re_scan_foreign_scan(_node: *mut pg_sys::ForeignScanState) {}

#[pg_guard]
unsafe extern "C-unwind" fn end_foreign_scan(node: *mut pg_sys::ForeignScanState) {
    // SAFETY: `fdw_state` is null or the Box leaked by `begin_foreign_scan`.
    unsafe {
        let state = (*node).fdw_state as *mut ScanState;
        if !state.is_null() {
            drop(Box::from_raw(state));
            (*node).fdw_state = ptr::null_mut();
        }
    }
}

#[pg_guard]
unsafe extern "C-unwind" fn explain_foreign_scan(
    node: *mut pg_sys::ForeignScanState,
    es: *mut pg_sys::ExplainState,
) {
    // SAFETY: `fdw_state` is null or the live state of this scan.
    unsafe {
        let state = (*node).fdw_state as *const ScanState;
        if state.is_null() {
            return;
        }
        let label = PgMemoryContexts::CurrentMemoryContext.pstrdup("Remote SQL");
        let value = PgMemoryContexts::CurrentMemoryContext.pstrdup(&(*state).plan.sql);
        pg_sys::ExplainPropertyText(label, value, es);
    }
}
