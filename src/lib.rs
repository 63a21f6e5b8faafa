//! tibero_fdw: condition pushdown for a Tibero foreign-data wrapper.
//!
//! Decides which scan conditions a remote Tibero server can evaluate with
//! the same result as PostgreSQL, and renders them, with the columns the
//! query reads, into Oracle-dialect SQL.
//!
//! The [`pushdown`] core is plain Rust and runs without a PostgreSQL
//! backend. Building with the `pg18` feature adds the extension glue: GUC
//! registration, the option validator, the FDW handler, a catalog adapter
//! backed by the PostgreSQL catalogs, and forwarding of log events to the
//! server log.
//!
//! # Safety
//! The `pg18` glue uses `unsafe` code for PostgreSQL FFI calls via pgrx.
//! All unsafe blocks are documented with `// SAFETY:` comments.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod error;
pub mod logging;
pub mod options;
pub mod pushdown;

#[cfg(feature = "pg18")]
pub mod pg;

#[cfg(feature = "pg18")]
::pgrx::pg_module_magic!();

/// Extension initialization, called when the shared library is loaded.
#[cfg(feature = "pg18")]
#[allow(non_snake_case)]
#[pgrx::pg_guard]
pub extern "C-unwind" fn _PG_init() {
    config::register_gucs();
    pg::install_log_forwarding();
}

#[cfg(feature = "pg18")]
pgrx::extension_sql!(
    r#"
CREATE FUNCTION tibero_fdw_handler() RETURNS fdw_handler
    AS 'MODULE_PATHNAME', 'tibero_fdw_handler'
    LANGUAGE C STRICT;

CREATE FOREIGN DATA WRAPPER tibero_fdw
    HANDLER tibero_fdw_handler
    VALIDATOR tibero_fdw_validator;
"#,
    name = "tibero_fdw_wrapper",
    requires = [pg::tibero_fdw_validator],
);
