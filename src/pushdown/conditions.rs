//! Routing of scan conditions between the remote server and the host.

use tracing::debug;

use crate::error::FdwError;
use crate::pushdown::catalog::MetadataOracle;
use crate::pushdown::expr::Expr;
use crate::pushdown::relation::ForeignRelation;
use crate::pushdown::shippable::classify;

/// Split `candidates` into conditions the remote server evaluates and
/// conditions the host evaluates. Input order is kept in both lists.
pub fn partition_conditions(
    candidates: &[Expr],
    relation: &ForeignRelation,
    oracle: &dyn MetadataOracle,
) -> Result<(Vec<Expr>, Vec<Expr>), FdwError> {
    let mut remote = Vec::new();
    let mut local = Vec::new();

    for (i, cond) in candidates.iter().enumerate() {
        if classify(cond, relation, oracle)? {
            debug!(relation = %relation.relation_name, condition = i, "condition pushed down");
            remote.push(cond.clone());
        } else {
            debug!(
                relation = %relation.relation_name,
                condition = i,
                "condition evaluated locally"
            );
            local.push(cond.clone());
        }
    }

    Ok((remote, local))
}
