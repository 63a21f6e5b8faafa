//! Query pushdown for foreign scans.
//!
//! The planner hands over a scan relation and its candidate conditions.
//! The [`shippable`] classifier decides per condition whether the remote
//! server evaluates it with the same result as the host; the [`deparse`]
//! module renders the accepted ones, together with the columns the query
//! reads, into one remote SELECT.
//!
//! # Architecture
//!
//! ```text
//! conditions ──► partition_conditions ──► remote ──► render_select ──► SQL
//!                     │ classify()           local ──► host evaluation
//!                     ▼
//!               MetadataOracle (catalog lookups)
//! ```
//!
//! Everything here is synchronous and keeps its state in per-call
//! contexts. Catalog access goes through [`catalog::MetadataOracle`], so
//! the whole pipeline runs without a PostgreSQL backend when given a
//! [`catalog::StaticCatalog`].

pub mod catalog;
pub mod collation;
pub mod conditions;
pub mod deparse;
pub mod expr;
pub mod literal;
pub mod relation;
pub mod shippable;

#[cfg(test)]
pub(crate) mod test_helpers;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FdwError;
use crate::options::FdwRelationOptions;

pub use catalog::{MetadataOracle, StaticCatalog};
pub use conditions::partition_conditions;
pub use deparse::{BindSlot, DeparsedSelect, render_insert, render_select};
pub use expr::{AttrNumber, Expr, Oid};
pub use relation::ForeignRelation;
pub use shippable::classify;

/// Planner-private payload of a foreign scan.
///
/// Serialized into the plan so the executor can run the query without
/// repeating the planning work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignScanPlan {
    pub sql: String,
    pub retrieved_attrs: Vec<AttrNumber>,
    pub fetch_size: u32,
    pub use_fb_query: bool,
    pub params: Vec<BindSlot>,
}

impl ForeignScanPlan {
    pub fn to_json(&self) -> Result<String, FdwError> {
        serde_json::to_string(self)
            .map_err(|e| FdwError::InternalError(format!("serialize scan plan: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self, FdwError> {
        serde_json::from_str(text)
            .map_err(|e| FdwError::InternalError(format!("deserialize scan plan: {e}")))
    }
}

/// Result of planning one foreign scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedScan {
    pub plan: ForeignScanPlan,
    /// Conditions the remote query enforces.
    pub remote_conds: Vec<Expr>,
    /// Conditions the host evaluates on fetched rows.
    pub local_conds: Vec<Expr>,
}

/// Columns referenced by locally evaluated conditions must be fetched too.
fn with_local_columns(relation: &ForeignRelation, local_conds: &[Expr]) -> ForeignRelation {
    let mut relation = relation.clone();
    for var in local_conds.iter().flat_map(Expr::vars) {
        if var.rel_index == relation.rt_index && var.levels_up == 0 {
            relation.attrs_used.insert(var.attno);
        }
    }
    relation
}

/// Route the scan's conditions and render its remote query.
///
/// A remote condition the deparser cannot render on its own (an
/// unrepresentable constant, a node without a remote spelling) is demoted to
/// local evaluation and the query is rendered again.
pub fn plan_foreign_scan(
    relation: &ForeignRelation,
    candidates: &[Expr],
    options: &FdwRelationOptions,
    oracle: &dyn MetadataOracle,
) -> Result<PlannedScan, FdwError> {
    let (mut remote_conds, mut local_conds) = if options.enable_pushdown {
        partition_conditions(candidates, relation, oracle)?
    } else {
        debug!(relation = %relation.relation_name, "condition pushdown disabled");
        (Vec::new(), candidates.to_vec())
    };

    let scan_relation = with_local_columns(relation, &local_conds);
    let rendered = render_select(&scan_relation, &remote_conds, options.use_fb_query, oracle);
    let deparsed = match rendered {
        Ok(deparsed) => deparsed,
        Err(err) if err.is_recoverable_by_local_eval() => {
            let mut kept = Vec::with_capacity(remote_conds.len());
            let mut demoted = Vec::new();
            for cond in remote_conds {
                match render_select(relation, std::slice::from_ref(&cond), false, oracle) {
                    Err(e) if e.is_recoverable_by_local_eval() => {
                        warn!(
                            relation = %relation.relation_name,
                            error = %e,
                            "remote condition cannot be rendered, evaluating locally"
                        );
                        demoted.push(cond);
                    }
                    _ => kept.push(cond),
                }
            }
            if demoted.is_empty() {
                return Err(err);
            }
            remote_conds = kept;
            local_conds.extend(demoted);

            let scan_relation = with_local_columns(relation, &local_conds);
            render_select(&scan_relation, &remote_conds, options.use_fb_query, oracle)?
        }
        Err(err) => return Err(err),
    };

    debug!(
        relation = %relation.relation_name,
        remote = remote_conds.len(),
        local = local_conds.len(),
        sql = %deparsed.sql,
        "planned foreign scan"
    );

    Ok(PlannedScan {
        plan: ForeignScanPlan {
            sql: deparsed.sql,
            retrieved_attrs: deparsed.retrieved_attrs,
            fetch_size: options.fetch_size,
            use_fb_query: options.use_fb_query,
            params: deparsed.params,
        },
        remote_conds,
        local_conds,
    })
}
