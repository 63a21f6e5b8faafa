//! PostgreSQL glue: option validator, FDW handler, catalog adapter, log
//! forwarding.

pub mod catalog;
pub mod handler;
pub mod nodes;

use pgrx::prelude::*;
use pgrx::pg_sys;

use crate::error::FdwError;
use crate::logging::ForwardLayer;
use crate::options::{FdwRelationOptions, OptionTarget, split_options, validate_options};
use crate::pushdown::expr::{AttrNumber, Expr};
use crate::pushdown::relation::{ColumnDef, ForeignRelation};
use crate::pushdown::{PlannedScan, plan_foreign_scan};

pub use catalog::PgCatalog;

/// Send `tracing` events of this library to the server log.
///
/// Leaves an already installed global subscriber in place.
pub fn install_log_forwarding() {
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let layer = ForwardLayer::new(|level: Level, line: &str| match level {
        Level::ERROR | Level::WARN => pgrx::warning!("tibero_fdw: {}", line),
        Level::INFO => pgrx::log!("tibero_fdw: {}", line),
        Level::DEBUG => pgrx::debug1!("tibero_fdw: {}", line),
        Level::TRACE => pgrx::debug2!("tibero_fdw: {}", line),
    });
    let _ = tracing_subscriber::registry().with(layer).try_init();
}

/// Raise an `FdwError` as a PostgreSQL error.
pub(crate) fn raise(err: FdwError) -> ! {
    pgrx::error!("tibero_fdw: {}", err)
}

/// Validator for `OPTIONS (...)` on tibero_fdw objects.
///
/// Receives the complete option list of the object after the DDL statement
/// as `name=value` strings.
#[pg_extern]
pub fn tibero_fdw_validator(options: Option<Vec<Option<String>>>, catalog: pg_sys::Oid) {
    let Some(target) = OptionTarget::from_catalog(catalog.to_u32()) else {
        return;
    };

    let pairs = split_options(options.unwrap_or_default().into_iter().flatten());
    if let Err(e) = validate_options(target, &pairs) {
        raise(e);
    }
}

/// Columns of `table_oid` in attribute order, dropped ones included.
fn load_columns(table_oid: pg_sys::Oid) -> Result<(String, Vec<ColumnDef>), FdwError> {
    Spi::connect(|client| {
        let name = client
            .select(
                "SELECT relname::text FROM pg_catalog.pg_class WHERE oid = $1",
                Some(1),
                &[table_oid.into()],
            )?
            .first()
            .get_one::<String>()?
            .unwrap_or_default();

        let rows = client.select(
            "SELECT attnum, attname::text, atttypid, attisdropped \
             FROM pg_catalog.pg_attribute \
             WHERE attrelid = $1 AND attnum > 0 ORDER BY attnum",
            None,
            &[table_oid.into()],
        )?;
        let mut columns = Vec::new();
        for row in rows {
            columns.push(ColumnDef {
                attno: row.get::<i16>(1)?.unwrap_or_default(),
                name: row.get::<String>(2)?.unwrap_or_default(),
                type_oid: row
                    .get::<pg_sys::Oid>(3)?
                    .map_or(0, |oid| oid.to_u32()),
                is_dropped: row.get::<bool>(4)?.unwrap_or(false),
            });
        }
        Ok::<_, pgrx::spi::SpiError>((name, columns))
    })
    .map_err(|e| FdwError::InternalError(format!("reading columns of {table_oid:?}: {e}")))
}

/// Resolved server and table options of a foreign table.
fn relation_options(foreigntableid: pg_sys::Oid) -> Result<FdwRelationOptions, FdwError> {
    // SAFETY: the foreign table and its server exist while the planner
    // holds a lock on the table.
    let (server_options, table_options) = unsafe {
        let table = pg_sys::GetForeignTable(foreigntableid);
        let server = pg_sys::GetForeignServer((*table).serverid);
        (
            catalog::def_elems((*server).options),
            catalog::def_elems((*table).options),
        )
    };
    FdwRelationOptions::resolve(&server_options, &table_options)
}

/// Plan a base-relation foreign scan over the candidate `clauses`.
///
/// # Safety
/// `baserel` must be the planner's `RelOptInfo` for the foreign table
/// `foreigntableid`, valid for the duration of the call.
pub unsafe fn plan_base_scan(
    baserel: *mut pg_sys::RelOptInfo,
    foreigntableid: pg_sys::Oid,
    clauses: &[Expr],
) -> Result<PlannedScan, FdwError> {
    // SAFETY: caller guarantees `baserel` is valid.
    let (rt_index, target_exprs) = unsafe {
        let rel = &*baserel;
        (rel.relid, nodes::convert_list((*rel.reltarget).exprs)?)
    };

    let options = relation_options(foreigntableid)?;
    let (relation_name, columns) = load_columns(foreigntableid)?;

    let mut relation = ForeignRelation::new(foreigntableid.to_u32(), &relation_name, rt_index);
    relation.columns = columns;
    let used: Vec<AttrNumber> = target_exprs
        .iter()
        .flat_map(|e| e.vars())
        .filter(|v| v.rel_index == rt_index)
        .map(|v| v.attno)
        .collect();
    let relation = relation.using(&used);

    plan_foreign_scan(&relation, clauses, &options, &PgCatalog)
}
