//! Scan relation metadata handed over by the planner.

use std::collections::BTreeSet;

use crate::pushdown::expr::{AttrNumber, Oid, SELF_ITEM_POINTER_ATTRIBUTE_NUMBER};

/// One attribute of the foreign table's local definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub attno: AttrNumber,
    /// Local column name; the remote name may be overridden by the
    /// `column_name` option.
    pub name: String,
    pub type_oid: Oid,
    pub is_dropped: bool,
}

/// Which attributes the surrounding query reads from the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttrsUsed {
    pub columns: BTreeSet<AttrNumber>,
    /// A whole-row reference covers every column.
    pub whole_row: bool,
    /// The remote row identifier is needed (UPDATE/DELETE).
    pub row_identifier: bool,
}

impl AttrsUsed {
    /// Whether column `attno` must be fetched.
    pub fn wants(&self, attno: AttrNumber) -> bool {
        self.whole_row || self.columns.contains(&attno)
    }

    /// Record an attribute number as the planner reports it: `0` is the
    /// whole row, `-1` the row identifier, other system columns are ignored.
    pub fn insert(&mut self, attno: AttrNumber) {
        match attno {
            0 => self.whole_row = true,
            SELF_ITEM_POINTER_ATTRIBUTE_NUMBER => self.row_identifier = true,
            n if n > 0 => {
                self.columns.insert(n);
            }
            _ => {}
        }
    }
}

/// The foreign relation a scan reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRelation {
    pub table_oid: Oid,
    /// Local relation name, used when the table has no `table_name` option.
    pub relation_name: String,
    /// Range-table index of the scan.
    pub rt_index: u32,
    /// Row sources participating in the scan.
    pub relids: BTreeSet<u32>,
    /// Post-aggregation relation.
    pub is_upper: bool,
    /// Columns in attribute-number order, dropped ones included.
    pub columns: Vec<ColumnDef>,
    pub attrs_used: AttrsUsed,
}

impl ForeignRelation {
    /// A plain base-table scan of `table_oid` at range-table index `rt_index`.
    pub fn new(table_oid: Oid, relation_name: &str, rt_index: u32) -> Self {
        ForeignRelation {
            table_oid,
            relation_name: relation_name.to_string(),
            rt_index,
            relids: BTreeSet::from([rt_index]),
            is_upper: false,
            columns: Vec::new(),
            attrs_used: AttrsUsed::default(),
        }
    }

    /// Append a column; its attribute number is its 1-based position.
    pub fn with_column(mut self, name: &str, type_oid: Oid) -> Self {
        self.push_column(name, type_oid, false);
        self
    }

    /// Append a dropped column slot.
    pub fn with_dropped_column(mut self, type_oid: Oid) -> Self {
        let name = format!("........pg.dropped.{}........", self.columns.len() + 1);
        self.push_column(&name, type_oid, true);
        self
    }

    fn push_column(&mut self, name: &str, type_oid: Oid, is_dropped: bool) {
        let attno = AttrNumber::try_from(self.columns.len() + 1).unwrap_or(AttrNumber::MAX);
        self.columns.push(ColumnDef {
            attno,
            name: name.to_string(),
            type_oid,
            is_dropped,
        });
    }

    /// Mark attributes as read by the query (see [`AttrsUsed::insert`]).
    pub fn using(mut self, attnos: &[AttrNumber]) -> Self {
        for &attno in attnos {
            self.attrs_used.insert(attno);
        }
        self
    }

    /// Add more participating row sources (join scans).
    pub fn with_relids(mut self, relids: &[u32]) -> Self {
        self.relids.extend(relids.iter().copied());
        self
    }

    pub fn as_upper(mut self) -> Self {
        self.is_upper = true;
        self
    }

    /// Column references need an `r<n>.` qualifier when several row
    /// sources participate.
    pub fn qualify_columns(&self) -> bool {
        self.relids.len() > 1
    }

    pub fn column(&self, attno: AttrNumber) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.attno == attno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pushdown::expr::pg_type;

    #[test]
    fn test_columns_numbered_in_order() {
        let rel = ForeignRelation::new(16384, "t", 1)
            .with_column("a", pg_type::INT4OID)
            .with_dropped_column(pg_type::INT4OID)
            .with_column("c", pg_type::TEXTOID);
        let attnos: Vec<_> = rel.columns.iter().map(|c| c.attno).collect();
        assert_eq!(attnos, vec![1, 2, 3]);
        assert!(rel.column(2).is_some_and(|c| c.is_dropped));
        assert_eq!(rel.column(3).map(|c| c.name.as_str()), Some("c"));
        assert!(rel.column(4).is_none());
    }

    #[test]
    fn test_attrs_used_insert() {
        let mut used = AttrsUsed::default();
        assert!(!used.wants(2));
        used.insert(2);
        used.insert(-1);
        used.insert(-6);
        assert!(used.wants(2));
        assert!(!used.wants(1));
        assert!(used.row_identifier);
        used.insert(0);
        assert!(used.wants(1));
    }

    #[test]
    fn test_qualify_columns_only_for_multiple_relids() {
        let rel = ForeignRelation::new(1, "t", 1);
        assert!(!rel.qualify_columns());
        let rel = rel.with_relids(&[2]);
        assert!(rel.qualify_columns());
        assert!(rel.relids.contains(&1) && rel.relids.contains(&2));
    }
}
