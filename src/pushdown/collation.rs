//! Collation state tracking for the shippability walk.
//!
//! Every node visited by the classifier folds its collation into a
//! [`CollationTracker`]. The tracker keeps the strongest state seen so far
//! together with the collation that produced it. Two different explicit
//! collations meeting in one expression escalate to
//! [`CollationState::UnsafeToShip`]: the remote engine would compare with a
//! different rule than the host.
//!
//! The merge is order-sensitive. A default collation is only replaced by an
//! explicit one when it is the stored collation at the time the explicit one
//! arrives, so visitation order must stay left to right, depth first.

use crate::pushdown::expr::{DEFAULT_COLLATION_OID, Oid};

/// How much is known about the collation behavior of an expression.
///
/// Ordered: a later variant dominates an earlier one on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CollationState {
    /// No collation, or only the database default.
    #[default]
    SafeToShip,
    /// An explicit collation is involved; it must not meet a different one.
    NeedInspection,
    /// Conflicting collations; the expression must be evaluated locally.
    UnsafeToShip,
}

/// Running collation state of one classification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollationTracker {
    state: CollationState,
    collation: Option<Oid>,
}

impl CollationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything merged so far.
    pub fn reset(&mut self) {
        self.state = CollationState::SafeToShip;
        self.collation = None;
    }

    pub fn state(&self) -> CollationState {
        self.state
    }

    /// The collation that produced the current state, if any.
    pub fn collation(&self) -> Option<Oid> {
        self.collation
    }

    pub fn currently_unsafe(&self) -> bool {
        self.state == CollationState::UnsafeToShip
    }

    /// State a single collation contributes on its own, given what the
    /// tracker has already seen.
    fn derive(&self, candidate: Option<Oid>) -> CollationState {
        match candidate {
            None => CollationState::SafeToShip,
            Some(c)
                if self.state == CollationState::NeedInspection
                    && self.collation == Some(c) =>
            {
                CollationState::NeedInspection
            }
            Some(DEFAULT_COLLATION_OID) => CollationState::SafeToShip,
            Some(_) => CollationState::NeedInspection,
        }
    }

    /// Fold one node's collation into the running state and return the
    /// resulting state.
    pub fn merge_collation(&mut self, candidate: Option<Oid>) -> CollationState {
        let derived = self.derive(candidate);

        if derived > self.state {
            self.state = derived;
            self.collation = candidate;
        } else if derived == self.state
            && derived == CollationState::NeedInspection
            && candidate != self.collation
        {
            // `merge_collation` never stores the default collation with
            // NeedInspection; a tracker built in that state widens.
            if self.collation == Some(DEFAULT_COLLATION_OID) {
                self.collation = candidate;
            } else {
                self.state = CollationState::UnsafeToShip;
            }
        }

        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C_COLLATION: Oid = 950;
    const POSIX_COLLATION: Oid = 951;

    #[test]
    fn test_state_ordering() {
        assert!(CollationState::SafeToShip < CollationState::NeedInspection);
        assert!(CollationState::NeedInspection < CollationState::UnsafeToShip);
    }

    #[test]
    fn test_new_tracker_is_safe() {
        let tracker = CollationTracker::new();
        assert_eq!(tracker.state(), CollationState::SafeToShip);
        assert_eq!(tracker.collation(), None);
        assert!(!tracker.currently_unsafe());
    }

    #[test]
    fn test_no_collation_stays_safe() {
        let mut tracker = CollationTracker::new();
        assert_eq!(tracker.merge_collation(None), CollationState::SafeToShip);
        assert_eq!(tracker.merge_collation(None), CollationState::SafeToShip);
    }

    #[test]
    fn test_default_collation_is_safe() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(DEFAULT_COLLATION_OID));
        assert_eq!(tracker.state(), CollationState::SafeToShip);
        assert_eq!(tracker.collation(), None);
    }

    #[test]
    fn test_explicit_collation_needs_inspection() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        assert_eq!(tracker.state(), CollationState::NeedInspection);
        assert_eq!(tracker.collation(), Some(C_COLLATION));
    }

    #[test]
    fn test_same_explicit_collation_twice_is_fine() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        tracker.merge_collation(Some(C_COLLATION));
        assert_eq!(tracker.state(), CollationState::NeedInspection);
        assert!(!tracker.currently_unsafe());
    }

    #[test]
    fn test_default_absorbed_by_explicit() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        tracker.merge_collation(Some(DEFAULT_COLLATION_OID));
        tracker.merge_collation(None);
        assert_eq!(tracker.state(), CollationState::NeedInspection);
        assert_eq!(tracker.collation(), Some(C_COLLATION));

        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(DEFAULT_COLLATION_OID));
        tracker.merge_collation(Some(C_COLLATION));
        assert_eq!(tracker.state(), CollationState::NeedInspection);
        assert_eq!(tracker.collation(), Some(C_COLLATION));
    }

    #[test]
    fn test_conflicting_collations_are_unsafe() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        assert_eq!(
            tracker.merge_collation(Some(POSIX_COLLATION)),
            CollationState::UnsafeToShip
        );
        assert!(tracker.currently_unsafe());
    }

    #[test]
    fn test_unsafe_is_sticky() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        tracker.merge_collation(Some(POSIX_COLLATION));
        tracker.merge_collation(None);
        tracker.merge_collation(Some(DEFAULT_COLLATION_OID));
        tracker.merge_collation(Some(C_COLLATION));
        assert!(tracker.currently_unsafe());
    }

    #[test]
    fn test_stored_default_widens_to_explicit() {
        let mut tracker = CollationTracker {
            state: CollationState::NeedInspection,
            collation: Some(DEFAULT_COLLATION_OID),
        };
        assert_eq!(
            tracker.merge_collation(Some(C_COLLATION)),
            CollationState::NeedInspection
        );
        assert_eq!(tracker.collation(), Some(C_COLLATION));
        assert_eq!(
            tracker.merge_collation(Some(POSIX_COLLATION)),
            CollationState::UnsafeToShip
        );
    }

    #[test]
    fn test_reset() {
        let mut tracker = CollationTracker::new();
        tracker.merge_collation(Some(C_COLLATION));
        tracker.merge_collation(Some(POSIX_COLLATION));
        tracker.reset();
        assert_eq!(tracker, CollationTracker::new());
    }
}
