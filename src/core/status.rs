//! Lifecycle transition tables for purchase orders and purchase returns.
//!
//! Each table maps a status to the statuses it may move to. A transition is
//! valid iff the target differs from the current status and appears in the
//! current status's row.

use crate::{
    entities::{PurchaseOrderStatus, PurchaseReturnStatus},
    errors::{Error, Result},
};
use std::fmt;

/// Allowed purchase order transitions.
pub const PURCHASE_ORDER_TRANSITIONS: &[(PurchaseOrderStatus, &[PurchaseOrderStatus])] = {
    use PurchaseOrderStatus::{
        Approved, Cancelled, Closed, Draft, FullyReceived, PartialReceived, Rejected, Sent,
    };
    &[
        (Draft, &[Sent, Cancelled]),
        (Sent, &[Approved, Rejected, Cancelled]),
        (Approved, &[PartialReceived, FullyReceived, Cancelled]),
        (Rejected, &[Draft, Cancelled]),
        (PartialReceived, &[FullyReceived, Closed]),
        (FullyReceived, &[Closed]),
        (Cancelled, &[]),
        (Closed, &[]),
    ]
};

/// Allowed purchase return transitions.
pub const PURCHASE_RETURN_TRANSITIONS: &[(PurchaseReturnStatus, &[PurchaseReturnStatus])] = {
    use PurchaseReturnStatus::{Approved, Cancelled, Draft, Processed};
    &[
        (Draft, &[Approved, Cancelled]),
        (Approved, &[Processed, Cancelled]),
        (Processed, &[]),
        (Cancelled, &[]),
    ]
};

/// A status enum governed by a transition table.
pub trait Lifecycle: Copy + PartialEq + fmt::Debug + 'static {
    /// The full transition table, one row per status.
    fn transitions() -> &'static [(Self, &'static [Self])];

    /// Snake-case name, as stored.
    fn label(self) -> &'static str;

    /// Statuses reachable in one step from `self`.
    fn allowed_next(self) -> &'static [Self] {
        Self::transitions()
            .iter()
            .find(|(from, _)| *from == self)
            .map_or(&[], |(_, next)| *next)
    }

    /// Whether `self -> to` is allowed. Self-loops never are.
    fn can_transition_to(self, to: Self) -> bool {
        self != to && self.allowed_next().contains(&to)
    }

    /// Whether no transition leaves `self`.
    fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }
}

impl Lifecycle for PurchaseOrderStatus {
    fn transitions() -> &'static [(Self, &'static [Self])] {
        PURCHASE_ORDER_TRANSITIONS
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::PartialReceived => "partial_received",
            Self::FullyReceived => "fully_received",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
        }
    }
}

impl Lifecycle for PurchaseReturnStatus {
    fn transitions() -> &'static [(Self, &'static [Self])] {
        PURCHASE_RETURN_TRANSITIONS
    }

    fn label(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Processed => "processed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Fails with [`Error::InvalidTransition`] naming both statuses unless `from -> to` is allowed.
pub fn ensure_transition<S: Lifecycle>(from: S, to: S) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.label().to_string(),
            to: to.label().to_string(),
        })
    }
}
