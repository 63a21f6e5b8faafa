//! GUC (Grand Unified Configuration) variables for tibero_fdw.
//!
//! Registered in `_PG_init()` when built as an extension. All GUC names are
//! prefixed with `tibero_fdw.`. Without the `pg18` feature the accessors
//! return the built-in defaults.

#[cfg(feature = "pg18")]
use pgrx::guc::*;

/// Default of `tibero_fdw.enable_pushdown`.
pub const DEFAULT_ENABLE_PUSHDOWN: bool = true;

/// Master switch for condition pushdown. When off, every scan condition
/// is evaluated locally and the remote query has no WHERE clause.
#[cfg(feature = "pg18")]
pub static TIBERO_FDW_ENABLE_PUSHDOWN: GucSetting<bool> =
    GucSetting::<bool>::new(DEFAULT_ENABLE_PUSHDOWN);

/// Register all GUC variables. Called from `_PG_init()`.
#[cfg(feature = "pg18")]
pub fn register_gucs() {
    GucRegistry::define_bool_guc(
        c"tibero_fdw.enable_pushdown",
        c"Send shippable scan conditions to the remote server.",
        c"When false, all conditions of foreign scans are evaluated locally.",
        &TIBERO_FDW_ENABLE_PUSHDOWN,
        GucContext::Userset,
        GucFlags::default(),
    );
}

// ── Convenience accessors ──────────────────────────────────────────────────

/// Returns the current value of `tibero_fdw.enable_pushdown`.
#[cfg(feature = "pg18")]
pub fn tibero_fdw_enable_pushdown() -> bool {
    TIBERO_FDW_ENABLE_PUSHDOWN.get()
}

/// Returns the current value of `tibero_fdw.enable_pushdown`.
#[cfg(not(feature = "pg18"))]
pub fn tibero_fdw_enable_pushdown() -> bool {
    DEFAULT_ENABLE_PUSHDOWN
}

#[cfg(all(test, not(feature = "pg18")))]
mod tests {
    use super::*;

    #[test]
    fn test_pushdown_enabled_by_default() {
        assert!(tibero_fdw_enable_pushdown());
    }
}
