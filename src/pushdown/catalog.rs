//! Expression metadata oracle.
//!
//! Every catalog question the classifier and the deparser ask goes through
//! [`MetadataOracle`]. Inside PostgreSQL the answers come from the syscache
//! (`crate::pg::catalog::PgCatalog`); everywhere else [`StaticCatalog`]
//! answers from an in-memory table of built-in operators and functions.
//!
//! All lookups are read-only and are only required to be consistent for the
//! duration of one planning call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::FdwError;
use crate::pushdown::expr::{AttrNumber, Datum, FIRST_GENBKI_OBJECT_ID, Oid};
use crate::pushdown::literal;

/// Function volatility class (`provolatile`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Volatility {
    Immutable,
    Stable,
    Volatile,
}

impl Volatility {
    /// Decode a `provolatile` character. Unknown codes are treated as volatile.
    pub fn from_code(code: char) -> Self {
        match code {
            'i' => Volatility::Immutable,
            's' => Volatility::Stable,
            _ => Volatility::Volatile,
        }
    }

    /// Immutable functions return the same result for the same arguments,
    /// wherever they are evaluated.
    pub fn is_immutable(self) -> bool {
        self == Volatility::Immutable
    }
}

/// Operator shape (`oprkind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorKind {
    /// `lhs op rhs`
    Binary,
    /// `op rhs`
    Prefix,
}

impl OperatorKind {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'b' => Some(OperatorKind::Binary),
            'l' => Some(OperatorKind::Prefix),
            _ => None,
        }
    }

    /// Number of operands the operator takes.
    pub fn arity(self) -> usize {
        match self {
            OperatorKind::Binary => 2,
            OperatorKind::Prefix => 1,
        }
    }
}

/// Catalog entry for an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorInfo {
    pub name: String,
    pub kind: OperatorKind,
    /// Volatility of the implementing function.
    pub volatility: Volatility,
}

/// Catalog entry for a function or aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: String,
    pub volatility: Volatility,
}

/// Where a foreign table lives on the remote server, from its options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableLocation {
    pub owner_name: Option<String>,
    pub table_name: Option<String>,
}

/// Read-only catalog lookups used during classification and deparsing.
pub trait MetadataOracle {
    /// Whether `oid` names a built-in object whose remote equivalent behaves
    /// the same. Only objects created by `initdb` qualify.
    fn is_builtin_compatible(&self, oid: Oid) -> bool {
        oid < FIRST_GENBKI_OBJECT_ID
    }

    fn function_info(&self, func_oid: Oid) -> Option<FunctionInfo>;

    fn operator_info(&self, op_oid: Oid) -> Option<OperatorInfo>;

    /// Text produced by the type's output routine for `value`.
    fn type_output(&self, _type_oid: Oid, value: &Datum) -> Result<String, FdwError> {
        default_type_output(value)
    }

    /// The `column_name` option of a foreign table column, if set.
    fn column_name_override(&self, table_oid: Oid, attno: AttrNumber) -> Option<String>;

    /// The `owner_name` / `table_name` options of a foreign table.
    fn foreign_table_location(&self, table_oid: Oid) -> TableLocation;

    /// Whether the host transaction already reads from one snapshot for its
    /// whole duration (REPEATABLE READ / SERIALIZABLE).
    fn uses_transaction_snapshot(&self) -> bool {
        false
    }
}

/// Look up an operator, treating a missing entry as catalog corruption.
pub fn lookup_operator(oracle: &dyn MetadataOracle, op_oid: Oid) -> Result<OperatorInfo, FdwError> {
    oracle.operator_info(op_oid).ok_or(FdwError::CatalogLookup {
        kind: "operator",
        oid: op_oid,
    })
}

/// Look up a function, treating a missing entry as catalog corruption.
pub fn lookup_function(
    oracle: &dyn MetadataOracle,
    func_oid: Oid,
) -> Result<FunctionInfo, FdwError> {
    oracle.function_info(func_oid).ok_or(FdwError::CatalogLookup {
        kind: "function",
        oid: func_oid,
    })
}

/// Text output for a decoded datum, matching the built-in output routines.
pub fn default_type_output(value: &Datum) -> Result<String, FdwError> {
    let text = match value {
        Datum::Null => {
            return Err(FdwError::InternalError(
                "type output routine called on a NULL value".into(),
            ));
        }
        Datum::Bool(true) => "t".to_string(),
        Datum::Bool(false) => "f".to_string(),
        Datum::Int(i) => i.to_string(),
        Datum::Float(f) if f.is_nan() => "NaN".to_string(),
        Datum::Float(f) if f.is_infinite() && *f > 0.0 => "Infinity".to_string(),
        Datum::Float(f) if f.is_infinite() => "-Infinity".to_string(),
        Datum::Float(f) => f.to_string(),
        Datum::Float4(f) if f.is_nan() => "NaN".to_string(),
        Datum::Float4(f) if f.is_infinite() && *f > 0.0 => "Infinity".to_string(),
        Datum::Float4(f) if f.is_infinite() => "-Infinity".to_string(),
        Datum::Float4(f) => f.to_string(),
        Datum::Numeric(s) | Datum::Text(s) | Datum::Uuid(s) => s.clone(),
        Datum::Date(days) => literal::date_output(*days),
        Datum::Timestamp(micros) => literal::timestamp_output(*micros),
        Datum::TimestampTz {
            utc_micros,
            utc_offset_secs,
        } => literal::timestamptz_output(*utc_micros, *utc_offset_secs),
        Datum::Interval(iv) => literal::interval_output(iv),
    };
    Ok(text)
}

/// Oids of the built-in objects preloaded into [`StaticCatalog`].
pub mod builtin {
    use crate::pushdown::expr::Oid;

    // Operators.
    pub const INT4_EQ: Oid = 96;
    pub const INT4_LT: Oid = 97;
    pub const TEXT_EQ: Oid = 98;
    pub const INT4_MUL: Oid = 514;
    pub const INT4_NE: Oid = 518;
    pub const INT4_GT: Oid = 521;
    pub const INT4_LE: Oid = 523;
    pub const INT4_GE: Oid = 525;
    pub const INT4_DIV: Oid = 528;
    pub const INT4_MOD: Oid = 530;
    pub const TEXT_NE: Oid = 531;
    pub const INT4_PL: Oid = 551;
    pub const INT4_MI: Oid = 555;
    pub const INT4_UM: Oid = 558;
    pub const TEXT_REGEX_EQ: Oid = 641;
    pub const TEXT_REGEX_NE: Oid = 642;
    pub const TEXT_CONCAT: Oid = 654;
    pub const FLOAT8_EQ: Oid = 670;
    pub const FLOAT8_GT: Oid = 674;
    pub const DATE_EQ: Oid = 1093;
    pub const DATE_GT: Oid = 1097;
    pub const TEXT_LIKE: Oid = 1209;
    pub const TEXT_NOT_LIKE: Oid = 1210;
    pub const TEXT_ILIKE: Oid = 1627;
    pub const NUMERIC_EQ: Oid = 1752;
    pub const NUMERIC_LT: Oid = 1754;
    pub const NUMERIC_GT: Oid = 1756;
    pub const TIMESTAMP_EQ: Oid = 2060;
    pub const TIMESTAMP_GT: Oid = 2064;
    pub const TIMESTAMPTZ_EQ: Oid = 1320;
    pub const TIMESTAMPTZ_GT: Oid = 1324;

    // Functions.
    pub const LOWER: Oid = 870;
    pub const UPPER: Oid = 871;
    pub const SUBSTR: Oid = 877;
    pub const NOW: Oid = 1299;
    pub const LENGTH: Oid = 1317;
    pub const ABS_INT4: Oid = 1397;
    pub const RANDOM: Oid = 1598;
    pub const INT4_TO_NUMERIC: Oid = 1740;
    pub const INT4_TO_FLOAT8: Oid = 316;

    // Aggregates.
    pub const AVG_INT4: Oid = 2101;
    pub const SUM_INT4: Oid = 2108;
    pub const MAX_INT4: Oid = 2116;
    pub const MIN_INT4: Oid = 2132;
    pub const COUNT_STAR: Oid = 2803;
}

/// An in-memory [`MetadataOracle`].
///
/// Starts out with the built-in objects listed in [`builtin`]; foreign
/// tables, column options and extra objects are added with the `with_*`
/// builders.
#[derive(Debug, Clone)]
pub struct StaticCatalog {
    operators: HashMap<Oid, OperatorInfo>,
    functions: HashMap<Oid, FunctionInfo>,
    locations: HashMap<Oid, TableLocation>,
    column_names: HashMap<(Oid, AttrNumber), String>,
    transaction_snapshot: bool,
}

impl Default for StaticCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticCatalog {
    /// A catalog preloaded with the built-in operators and functions.
    pub fn new() -> Self {
        use self::builtin::*;
        use OperatorKind::{Binary, Prefix};
        use Volatility::{Immutable, Stable, Volatile};

        let mut catalog = StaticCatalog {
            operators: HashMap::new(),
            functions: HashMap::new(),
            locations: HashMap::new(),
            column_names: HashMap::new(),
            transaction_snapshot: false,
        };

        let operators: &[(Oid, &str, OperatorKind)] = &[
            (INT4_EQ, "=", Binary),
            (INT4_LT, "<", Binary),
            (TEXT_EQ, "=", Binary),
            (INT4_MUL, "*", Binary),
            (INT4_NE, "<>", Binary),
            (INT4_GT, ">", Binary),
            (INT4_LE, "<=", Binary),
            (INT4_GE, ">=", Binary),
            (INT4_DIV, "/", Binary),
            (INT4_MOD, "%", Binary),
            (TEXT_NE, "<>", Binary),
            (INT4_PL, "+", Binary),
            (INT4_MI, "-", Binary),
            (INT4_UM, "-", Prefix),
            (TEXT_REGEX_EQ, "~", Binary),
            (TEXT_REGEX_NE, "!~", Binary),
            (TEXT_CONCAT, "||", Binary),
            (FLOAT8_EQ, "=", Binary),
            (FLOAT8_GT, ">", Binary),
            (DATE_EQ, "=", Binary),
            (DATE_GT, ">", Binary),
            (TEXT_LIKE, "~~", Binary),
            (TEXT_NOT_LIKE, "!~~", Binary),
            (TEXT_ILIKE, "~~*", Binary),
            (NUMERIC_EQ, "=", Binary),
            (NUMERIC_LT, "<", Binary),
            (NUMERIC_GT, ">", Binary),
            (TIMESTAMP_EQ, "=", Binary),
            (TIMESTAMP_GT, ">", Binary),
            (TIMESTAMPTZ_EQ, "=", Binary),
            (TIMESTAMPTZ_GT, ">", Binary),
        ];
        for (oid, name, kind) in operators {
            catalog = catalog.with_operator(*oid, name, *kind, Immutable);
        }

        let functions: &[(Oid, &str, Volatility)] = &[
            (LOWER, "lower", Immutable),
            (UPPER, "upper", Immutable),
            (SUBSTR, "substr", Immutable),
            (NOW, "now", Stable),
            (LENGTH, "length", Immutable),
            (ABS_INT4, "abs", Immutable),
            (RANDOM, "random", Volatile),
            (INT4_TO_NUMERIC, "numeric", Immutable),
            (INT4_TO_FLOAT8, "float8", Immutable),
            (AVG_INT4, "avg", Immutable),
            (SUM_INT4, "sum", Immutable),
            (MAX_INT4, "max", Immutable),
            (MIN_INT4, "min", Immutable),
            (COUNT_STAR, "count", Immutable),
        ];
        for (oid, name, volatility) in functions {
            catalog = catalog.with_function(*oid, name, *volatility);
        }

        catalog
    }

    /// Register (or replace) an operator.
    pub fn with_operator(
        mut self,
        oid: Oid,
        name: &str,
        kind: OperatorKind,
        volatility: Volatility,
    ) -> Self {
        self.operators.insert(
            oid,
            OperatorInfo {
                name: name.to_string(),
                kind,
                volatility,
            },
        );
        self
    }

    /// Register (or replace) a function or aggregate.
    pub fn with_function(mut self, oid: Oid, name: &str, volatility: Volatility) -> Self {
        self.functions.insert(
            oid,
            FunctionInfo {
                name: name.to_string(),
                volatility,
            },
        );
        self
    }

    /// Set the `owner_name` / `table_name` options of a foreign table.
    pub fn with_table_location(
        mut self,
        table_oid: Oid,
        owner_name: Option<&str>,
        table_name: Option<&str>,
    ) -> Self {
        self.locations.insert(
            table_oid,
            TableLocation {
                owner_name: owner_name.map(str::to_string),
                table_name: table_name.map(str::to_string),
            },
        );
        self
    }

    /// Set the `column_name` option of a foreign table column.
    pub fn with_column_name(mut self, table_oid: Oid, attno: AttrNumber, name: &str) -> Self {
        self.column_names
            .insert((table_oid, attno), name.to_string());
        self
    }

    /// Pretend the host transaction runs at REPEATABLE READ or above.
    pub fn with_transaction_snapshot(mut self, enabled: bool) -> Self {
        self.transaction_snapshot = enabled;
        self
    }
}

impl MetadataOracle for StaticCatalog {
    fn function_info(&self, func_oid: Oid) -> Option<FunctionInfo> {
        self.functions.get(&func_oid).cloned()
    }

    fn operator_info(&self, op_oid: Oid) -> Option<OperatorInfo> {
        self.operators.get(&op_oid).cloned()
    }

    fn column_name_override(&self, table_oid: Oid, attno: AttrNumber) -> Option<String> {
        self.column_names.get(&(table_oid, attno)).cloned()
    }

    fn foreign_table_location(&self, table_oid: Oid) -> TableLocation {
        self.locations.get(&table_oid).cloned().unwrap_or_default()
    }

    fn uses_transaction_snapshot(&self) -> bool {
        self.transaction_snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volatility_from_code() {
        assert_eq!(Volatility::from_code('i'), Volatility::Immutable);
        assert_eq!(Volatility::from_code('s'), Volatility::Stable);
        assert_eq!(Volatility::from_code('v'), Volatility::Volatile);
        assert_eq!(Volatility::from_code('?'), Volatility::Volatile);
        assert!(Volatility::Immutable.is_immutable());
        assert!(!Volatility::Stable.is_immutable());
    }

    #[test]
    fn test_operator_kind_arity() {
        assert_eq!(OperatorKind::from_code('b'), Some(OperatorKind::Binary));
        assert_eq!(OperatorKind::from_code('l'), Some(OperatorKind::Prefix));
        assert_eq!(OperatorKind::from_code('r'), None);
        assert_eq!(OperatorKind::Binary.arity(), 2);
        assert_eq!(OperatorKind::Prefix.arity(), 1);
    }

    #[test]
    fn test_builtin_boundary() {
        let catalog = StaticCatalog::new();
        assert!(catalog.is_builtin_compatible(builtin::INT4_EQ));
        assert!(catalog.is_builtin_compatible(FIRST_GENBKI_OBJECT_ID - 1));
        assert!(!catalog.is_builtin_compatible(FIRST_GENBKI_OBJECT_ID));
        assert!(!catalog.is_builtin_compatible(16384));
    }

    #[test]
    fn test_lookup_missing_operator_is_error() {
        let catalog = StaticCatalog::new();
        let err = lookup_operator(&catalog, 4242).unwrap_err();
        assert_eq!(
            err,
            FdwError::CatalogLookup {
                kind: "operator",
                oid: 4242
            }
        );
        assert!(lookup_function(&catalog, builtin::UPPER).is_ok());
    }

    #[test]
    fn test_table_location_defaults_to_empty() {
        let catalog = StaticCatalog::new().with_table_location(16400, Some("SCOTT"), Some("EMP"));
        assert_eq!(
            catalog.foreign_table_location(16400).owner_name.as_deref(),
            Some("SCOTT")
        );
        assert_eq!(catalog.foreign_table_location(1), TableLocation::default());
    }

    #[test]
    fn test_column_name_override() {
        let catalog = StaticCatalog::new().with_column_name(16400, 2, "ENAME");
        assert_eq!(
            catalog.column_name_override(16400, 2).as_deref(),
            Some("ENAME")
        );
        assert_eq!(catalog.column_name_override(16400, 3), None);
    }

    #[test]
    fn test_default_type_output() {
        assert_eq!(default_type_output(&Datum::Int(-5)).unwrap(), "-5");
        assert_eq!(default_type_output(&Datum::Bool(true)).unwrap(), "t");
        assert_eq!(default_type_output(&Datum::Float(f64::NAN)).unwrap(), "NaN");
        assert_eq!(
            default_type_output(&Datum::Float(f64::NEG_INFINITY)).unwrap(),
            "-Infinity"
        );
        assert_eq!(default_type_output(&Datum::Float(1.5)).unwrap(), "1.5");
        assert_eq!(default_type_output(&Datum::Float4(0.1)).unwrap(), "0.1");
        assert_eq!(default_type_output(&Datum::Float4(f32::NAN)).unwrap(), "NaN");
        assert_eq!(
            default_type_output(&Datum::Numeric("12.340".into())).unwrap(),
            "12.340"
        );
        assert!(default_type_output(&Datum::Null).is_err());
    }
}
