//! Property-based tests using proptest.
//!
//! Tests the key invariants of condition pushdown:
//! - Classification is repeatable
//! - A non-built-in function anywhere in a tree rejects the tree
//! - Deparsed SQL has balanced parentheses
//! - Retrieved attributes come out ascending and match the used columns
//! - Empty strings reach the remote server as NULL
//! - Collation state only escalates, and conflicting collations stick

// These tests exercise pure functions from the library.
// We use `tibero_fdw` as a lib crate (cdylib + lib).

use proptest::prelude::*;
use tibero_fdw::pushdown::catalog::builtin::{
    ABS_INT4, INT4_EQ, INT4_GT, INT4_LT, INT4_PL, LOWER, TEXT_EQ,
};
use tibero_fdw::pushdown::collation::{CollationState, CollationTracker};
use tibero_fdw::pushdown::expr::{
    Const, DEFAULT_COLLATION_OID, Datum, Expr, FuncExpr, FuncFormat, Var, pg_type,
};
use tibero_fdw::pushdown::{ForeignRelation, StaticCatalog, classify, render_select};

const TABLE_OID: u32 = 16_384;
const C_COLLATION: u32 = 950;
const POSIX_COLLATION: u32 = 951;

// ── Helpers ────────────────────────────────────────────────────────────────

fn relation(used: &[i16]) -> ForeignRelation {
    ForeignRelation::new(TABLE_OID, "items", 1)
        .with_column("id", pg_type::INT4OID)
        .with_column("label", pg_type::TEXTOID)
        .with_column("qty", pg_type::INT4OID)
        .with_column("note", pg_type::TEXTOID)
        .with_column("price", pg_type::INT4OID)
        .using(used)
}

fn catalog() -> StaticCatalog {
    StaticCatalog::new().with_table_location(TABLE_OID, Some("app"), Some("ITEMS"))
}

fn int_col(attno: i16) -> Expr {
    Expr::Var(Var::column(1, attno, pg_type::INT4OID))
}

fn text_col() -> Expr {
    let mut var = Var::column(1, 2, pg_type::TEXTOID);
    var.collation = Some(DEFAULT_COLLATION_OID);
    Expr::Var(var)
}

fn int_const(v: i32) -> Expr {
    Expr::Const(Const::new(pg_type::INT4OID, Datum::Int(i64::from(v))))
}

fn text_const(v: &str) -> Expr {
    Expr::Const(Const {
        type_oid: pg_type::TEXTOID,
        collation: Some(DEFAULT_COLLATION_OID),
        value: Datum::Text(v.to_string()),
    })
}

fn call(func_oid: u32, result_type: u32, args: Vec<Expr>) -> Expr {
    Expr::FuncExpr(FuncExpr {
        func_oid,
        result_type,
        format: FuncFormat::Call,
        collation: None,
        input_collation: None,
        args,
    })
}

/// Strategy: an integer-valued operand.
fn arb_int_operand() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (1i16..=5).prop_filter("integer columns", |a| *a != 2 && *a != 4).prop_map(int_col),
        (-1000i32..1000).prop_map(int_const),
    ];
    leaf.prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::binary_op(INT4_PL, l, r)),
            inner.prop_map(|a| call(ABS_INT4, pg_type::INT4OID, vec![a])),
        ]
    })
}

/// Strategy: a boolean condition built from built-in, immutable pieces.
fn arb_condition() -> impl Strategy<Value = Expr> {
    let comparison = prop_oneof![
        (arb_int_operand(), arb_int_operand()).prop_map(|(l, r)| Expr::binary_op(INT4_EQ, l, r)),
        (arb_int_operand(), arb_int_operand()).prop_map(|(l, r)| Expr::binary_op(INT4_LT, l, r)),
        (arb_int_operand(), arb_int_operand()).prop_map(|(l, r)| Expr::binary_op(INT4_GT, l, r)),
        "[a-z ]{0,8}".prop_map(|s| Expr::binary_op(
            TEXT_EQ,
            call(LOWER, pg_type::TEXTOID, vec![text_col()]),
            text_const(&s)
        )),
    ];
    comparison.prop_recursive(3, 16, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::and),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Expr::or),
            inner.prop_map(Expr::not),
        ]
    })
}

fn depth_never_negative(sql: &str) -> bool {
    let mut depth = 0i32;
    for ch in sql.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    // ── Classification ─────────────────────────────────────────────

    #[test]
    fn prop_classification_is_repeatable(cond in arb_condition()) {
        let rel = relation(&[1]);
        let cat = catalog();
        let first = classify(&cond, &rel, &cat).unwrap();
        let second = classify(&cond, &rel, &cat).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_builtin_immutable_conditions_ship(cond in arb_condition()) {
        prop_assert!(classify(&cond, &relation(&[1]), &catalog()).unwrap());
    }

    #[test]
    fn prop_user_defined_function_rejects_whole_tree(
        cond in arb_condition(),
        udf in 16_384u32..100_000,
    ) {
        // A non-built-in oid is rejected before any catalog lookup.
        let poisoned = Expr::or(vec![
            cond,
            Expr::binary_op(INT4_EQ, call(udf, pg_type::INT4OID, vec![int_col(1)]), int_const(0)),
        ]);
        prop_assert!(!classify(&poisoned, &relation(&[1]), &catalog()).unwrap());
    }

    // ── Deparsing ──────────────────────────────────────────────────

    #[test]
    fn prop_deparsed_parentheses_balance(
        conds in prop::collection::vec(arb_condition(), 0..4),
        fb in any::<bool>(),
    ) {
        let deparsed = render_select(&relation(&[1, 3]), &conds, fb, &catalog()).unwrap();
        prop_assert!(depth_never_negative(&deparsed.sql), "unbalanced: {}", deparsed.sql);
    }

    #[test]
    fn prop_retrieved_attrs_ascending(used in prop::collection::vec(1i16..=5, 0..8)) {
        let deparsed = render_select(&relation(&used), &[], false, &catalog()).unwrap();
        let attrs = deparsed.retrieved_attrs;

        prop_assert!(attrs.windows(2).all(|w| w[0] < w[1]));
        let mut expected = used.clone();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(attrs, expected);
    }

    #[test]
    fn prop_empty_string_becomes_null(s in "[a-z]{0,6}") {
        let cond = Expr::binary_op(TEXT_EQ, text_col(), text_const(&s));
        let deparsed = render_select(&relation(&[1]), &[cond], false, &catalog()).unwrap();
        if s.is_empty() {
            prop_assert!(deparsed.sql.ends_with("(\"label\" = NULL)"), "{}", deparsed.sql);
        } else {
            let expected = format!("(\"label\" = '{s}')");
            prop_assert!(deparsed.sql.ends_with(&expected), "{}", deparsed.sql);
        }
    }

    // ── Collation tracking ─────────────────────────────────────────

    #[test]
    fn prop_collation_state_only_escalates(
        seq in prop::collection::vec(
            prop_oneof![
                Just(None),
                Just(Some(DEFAULT_COLLATION_OID)),
                Just(Some(C_COLLATION)),
                Just(Some(POSIX_COLLATION)),
            ],
            0..12,
        ),
    ) {
        let mut tracker = CollationTracker::new();
        let mut previous = tracker.state();
        for candidate in seq {
            let state = tracker.merge_collation(candidate);
            prop_assert!(state >= previous);
            if previous == CollationState::UnsafeToShip {
                prop_assert_eq!(state, CollationState::UnsafeToShip);
            }
            previous = state;
        }
    }

    #[test]
    fn prop_two_explicit_collations_conflict(
        prefix in prop::collection::vec(
            prop_oneof![Just(None), Just(Some(DEFAULT_COLLATION_OID))],
            0..5,
        ),
    ) {
        let mut tracker = CollationTracker::new();
        for candidate in prefix {
            prop_assert_eq!(tracker.merge_collation(candidate), CollationState::SafeToShip);
        }
        prop_assert_eq!(
            tracker.merge_collation(Some(C_COLLATION)),
            CollationState::NeedInspection
        );
        prop_assert_eq!(
            tracker.merge_collation(Some(POSIX_COLLATION)),
            CollationState::UnsafeToShip
        );
        prop_assert!(tracker.currently_unsafe());
    }
}
