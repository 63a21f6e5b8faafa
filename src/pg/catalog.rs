//! [`MetadataOracle`] backed by the PostgreSQL system catalogs.

use std::ffi::CStr;

use pgrx::prelude::*;
use pgrx::{PgList, pg_sys};

use crate::pushdown::catalog::{
    FunctionInfo, MetadataOracle, OperatorInfo, OperatorKind, TableLocation, Volatility,
};
use crate::pushdown::expr::{AttrNumber, Oid};

/// Catalog lookups for the current backend.
///
/// Must only be used inside a transaction, which is always the case during
/// planning.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgCatalog;

fn first_char(text: Option<String>) -> Option<char> {
    text.and_then(|t| t.chars().next())
}

/// Collect the `DefElem` options of a catalog list as `(name, value)`.
///
/// # Safety
/// `options` must be null or a valid `List` of `DefElem` nodes.
pub(crate) unsafe fn def_elems(options: *mut pg_sys::List) -> Vec<(String, String)> {
    // SAFETY: caller guarantees a List of DefElem (or NIL).
    let list = unsafe { PgList::<pg_sys::DefElem>::from_pg(options) };
    list.iter_ptr()
        .map(|def| {
            // SAFETY: every element of the list is a valid DefElem.
            unsafe {
                let name = CStr::from_ptr((*def).defname).to_string_lossy().into_owned();
                let value = CStr::from_ptr(pg_sys::defGetString(def))
                    .to_string_lossy()
                    .into_owned();
                (name, value)
            }
        })
        .collect()
}

fn find_option(options: &[(String, String)], name: &str) -> Option<String> {
    options
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

impl MetadataOracle for PgCatalog {
    fn function_info(&self, func_oid: Oid) -> Option<FunctionInfo> {
        Spi::connect(|client| {
            let rows = client.select(
                "SELECT proname::text, provolatile::text FROM pg_catalog.pg_proc WHERE oid = $1",
                Some(1),
                &[pg_sys::Oid::from(func_oid).into()],
            )?;
            for row in rows {
                let name = row.get::<String>(1)?.unwrap_or_default();
                let volatility = first_char(row.get::<String>(2)?).map(Volatility::from_code);
                return Ok(volatility.map(|volatility| FunctionInfo { name, volatility }));
            }
            Ok::<_, pgrx::spi::SpiError>(None)
        })
        .ok()
        .flatten()
    }

    fn operator_info(&self, op_oid: Oid) -> Option<OperatorInfo> {
        Spi::connect(|client| {
            let rows = client.select(
                "SELECT o.oprname::text, o.oprkind::text, p.provolatile::text \
                 FROM pg_catalog.pg_operator o \
                 JOIN pg_catalog.pg_proc p ON p.oid = o.oprcode \
                 WHERE o.oid = $1",
                Some(1),
                &[pg_sys::Oid::from(op_oid).into()],
            )?;
            for row in rows {
                let name = row.get::<String>(1)?.unwrap_or_default();
                let kind = first_char(row.get::<String>(2)?).and_then(OperatorKind::from_code);
                let volatility = first_char(row.get::<String>(3)?).map(Volatility::from_code);
                return Ok(match (kind, volatility) {
                    (Some(kind), Some(volatility)) => Some(OperatorInfo {
                        name,
                        kind,
                        volatility,
                    }),
                    _ => None,
                });
            }
            Ok::<_, pgrx::spi::SpiError>(None)
        })
        .ok()
        .flatten()
    }

    fn column_name_override(&self, table_oid: Oid, attno: AttrNumber) -> Option<String> {
        // SAFETY: GetForeignColumnOptions returns a palloc'd List of DefElem
        // for an existing foreign table column.
        let options = unsafe {
            def_elems(pg_sys::GetForeignColumnOptions(
                pg_sys::Oid::from(table_oid),
                attno,
            ))
        };
        find_option(&options, "column_name")
    }

    fn foreign_table_location(&self, table_oid: Oid) -> TableLocation {
        // SAFETY: the planner only asks for tables it is scanning, which are
        // foreign tables; GetForeignTable errors out otherwise.
        let options = unsafe {
            let table = pg_sys::GetForeignTable(pg_sys::Oid::from(table_oid));
            def_elems((*table).options)
        };
        TableLocation {
            owner_name: find_option(&options, "owner_name"),
            table_name: find_option(&options, "table_name"),
        }
    }

    fn uses_transaction_snapshot(&self) -> bool {
        // SAFETY: reading the backend's isolation level global.
        unsafe { pg_sys::XactIsoLevel >= pg_sys::XACT_REPEATABLE_READ as i32 }
    }
}
