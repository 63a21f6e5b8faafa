//! FDW option validation and resolution.
//!
//! Each object that carries options (foreign server, foreign table, user
//! mapping, foreign table column) has a registry of accepted keywords.
//! Validation runs on the complete option list of the object after a DDL
//! statement, so a required option that was dropped is reported as missing.
//!
//! Hidden options are accepted but not advertised in the hint listing the
//! valid options.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config;
use crate::error::FdwError;

pub const DEFAULT_FETCH_SIZE: u32 = 100;
pub const DEFAULT_STARTUP_COST: f64 = 100.0;
pub const DEFAULT_TUPLE_COST: f64 = 0.01;

/// Exclusive upper bound of `fetch_size`.
pub const MAX_FETCH_SIZE: i64 = i32::MAX as i64;

/// The kind of object an option list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionTarget {
    Server,
    Table,
    UserMapping,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Text,
    Bool,
    FetchSize,
}

#[derive(Debug, Clone, Copy)]
struct OptionSpec {
    keyword: &'static str,
    kind: ValueKind,
    hidden: bool,
    required: bool,
}

const fn opt(keyword: &'static str, kind: ValueKind, hidden: bool, required: bool) -> OptionSpec {
    OptionSpec {
        keyword,
        kind,
        hidden,
        required,
    }
}

const SERVER_OPTIONS: &[OptionSpec] = &[
    opt("host", ValueKind::Text, false, true),
    opt("port", ValueKind::Text, false, true),
    opt("dbname", ValueKind::Text, false, true),
    opt("fetch_size", ValueKind::FetchSize, false, false),
    opt("use_sleep_on_sig", ValueKind::Bool, true, false),
    opt("use_fb_query", ValueKind::Bool, true, false),
    opt("keep_connections", ValueKind::Bool, true, false),
];

const TABLE_OPTIONS: &[OptionSpec] = &[
    opt("owner_name", ValueKind::Text, false, false),
    opt("table_name", ValueKind::Text, false, true),
    opt("fetch_size", ValueKind::FetchSize, false, false),
    opt("use_fb_query", ValueKind::Bool, true, false),
];

const USER_MAPPING_OPTIONS: &[OptionSpec] = &[
    opt("username", ValueKind::Text, false, true),
    opt("password", ValueKind::Text, false, true),
    opt("password_required", ValueKind::Bool, true, false),
];

const COLUMN_OPTIONS: &[OptionSpec] = &[opt("column_name", ValueKind::Text, false, false)];

/// Catalog relation oids the validator is called with.
const ATTRIBUTE_RELATION_ID: u32 = 1249;
const FOREIGN_SERVER_RELATION_ID: u32 = 1417;
const USER_MAPPING_RELATION_ID: u32 = 1418;
const FOREIGN_TABLE_RELATION_ID: u32 = 3118;

impl OptionTarget {
    /// The target for a validator call on catalog `catalog_oid`. The wrapper
    /// itself takes no options, so its catalog maps to `None`.
    pub fn from_catalog(catalog_oid: u32) -> Option<Self> {
        match catalog_oid {
            FOREIGN_SERVER_RELATION_ID => Some(OptionTarget::Server),
            FOREIGN_TABLE_RELATION_ID => Some(OptionTarget::Table),
            USER_MAPPING_RELATION_ID => Some(OptionTarget::UserMapping),
            ATTRIBUTE_RELATION_ID => Some(OptionTarget::Column),
            _ => None,
        }
    }

    fn registry(self) -> &'static [OptionSpec] {
        match self {
            OptionTarget::Server => SERVER_OPTIONS,
            OptionTarget::Table => TABLE_OPTIONS,
            OptionTarget::UserMapping => USER_MAPPING_OPTIONS,
            OptionTarget::Column => COLUMN_OPTIONS,
        }
    }

    /// Comma-separated visible keywords, for the invalid-option hint.
    pub fn valid_options_hint(self) -> String {
        self.registry()
            .iter()
            .filter(|o| !o.hidden)
            .map(|o| o.keyword)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Split the `name=value` entries PostgreSQL hands to a validator.
pub fn split_options<I, S>(entries: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| match entry.as_ref().split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (entry.as_ref().to_string(), String::new()),
        })
        .collect()
}

/// Validate the full option list of one object.
pub fn validate_options(
    target: OptionTarget,
    options: &[(String, String)],
) -> Result<(), FdwError> {
    let registry = target.registry();
    let mut configured = vec![false; registry.len()];

    for (name, value) in options {
        let Some(idx) = registry.iter().position(|o| o.keyword == name) else {
            return Err(FdwError::InvalidOption {
                option: name.clone(),
                valid: target.valid_options_hint(),
            });
        };
        validate_value(&registry[idx], value)?;
        configured[idx] = true;
    }

    let missing: Vec<String> = registry
        .iter()
        .zip(&configured)
        .filter(|(o, set)| o.required && !**set)
        .map(|(o, _)| o.keyword.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(FdwError::MissingOptions(missing));
    }
    Ok(())
}

fn validate_value(spec: &OptionSpec, value: &str) -> Result<(), FdwError> {
    match spec.kind {
        ValueKind::Text => non_empty(spec.keyword, value).map(|_| ()),
        ValueKind::Bool => parse_bool(spec.keyword, value).map(|_| ()),
        ValueKind::FetchSize => parse_fetch_size(spec.keyword, value).map(|_| ()),
    }
}

fn non_empty<'v>(option: &str, value: &'v str) -> Result<&'v str, FdwError> {
    if value.is_empty() {
        return Err(FdwError::InvalidOptionValue {
            option: option.to_string(),
            reason: "requires non-empty value".into(),
        });
    }
    Ok(value)
}

/// Boolean option value, accepting the spellings PostgreSQL accepts.
pub fn parse_bool(option: &str, value: &str) -> Result<bool, FdwError> {
    let value = non_empty(option, value)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Ok(true),
        "false" | "off" | "no" | "0" => Ok(false),
        _ => Err(FdwError::InvalidOptionValue {
            option: option.to_string(),
            reason: format!("requires a Boolean value, got \"{value}\""),
        }),
    }
}

/// `fetch_size`: an integer in `1..2147483647`.
pub fn parse_fetch_size(option: &str, value: &str) -> Result<u32, FdwError> {
    let value = non_empty(option, value)?;
    let n: i64 = value
        .trim()
        .parse()
        .map_err(|_| FdwError::InvalidOptionValue {
            option: option.to_string(),
            reason: format!("invalid integer \"{value}\""),
        })?;
    if n <= 0 {
        return Err(FdwError::InvalidOptionValue {
            option: option.to_string(),
            reason: "must be an integer value greater than zero".into(),
        });
    }
    if n >= MAX_FETCH_SIZE {
        return Err(FdwError::InvalidOptionValue {
            option: option.to_string(),
            reason: "exceeded the maximum value".into(),
        });
    }
    u32::try_from(n).map_err(|_| FdwError::InternalError(format!("fetch_size {n} out of range")))
}

fn find<'a>(options: &'a [(String, String)], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Per-scan settings derived from server and table options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdwRelationOptions {
    pub fetch_size: u32,
    /// Read through a flashback snapshot (`as of tsn ?`).
    pub use_fb_query: bool,
    pub startup_cost: f64,
    pub tuple_cost: f64,
    /// Whether conditions may be sent to the remote server at all.
    pub enable_pushdown: bool,
}

impl Default for FdwRelationOptions {
    fn default() -> Self {
        FdwRelationOptions {
            fetch_size: DEFAULT_FETCH_SIZE,
            use_fb_query: false,
            startup_cost: DEFAULT_STARTUP_COST,
            tuple_cost: DEFAULT_TUPLE_COST,
            enable_pushdown: config::DEFAULT_ENABLE_PUSHDOWN,
        }
    }
}

impl FdwRelationOptions {
    /// Apply server options, then table options on top.
    pub fn resolve(
        server: &[(String, String)],
        table: &[(String, String)],
    ) -> Result<Self, FdwError> {
        let mut resolved = FdwRelationOptions {
            enable_pushdown: config::tibero_fdw_enable_pushdown(),
            ..Default::default()
        };

        if let Some(v) = find(server, "fetch_size") {
            resolved.fetch_size = parse_fetch_size("fetch_size", v)?;
        }
        if let Some(v) = find(server, "use_fb_query") {
            resolved.use_fb_query = parse_bool("use_fb_query", v)?;
        }

        if let Some(v) = find(table, "fetch_size") {
            resolved.fetch_size = parse_fetch_size("fetch_size", v)?;
        }
        if let Some(v) = find(table, "use_fb_query") {
            resolved.use_fb_query = parse_bool("use_fb_query", v)?;
        }

        debug!(
            fetch_size = resolved.fetch_size,
            use_fb_query = resolved.use_fb_query,
            "resolved foreign relation options"
        );
        Ok(resolved)
    }

    /// Startup and total cost of fetching `rows` rows.
    pub fn scan_costs(&self, rows: f64) -> (f64, f64) {
        let startup = self.startup_cost;
        (startup, startup + self.tuple_cost * rows.max(0.0))
    }
}
