//! Error taxonomy for the order sync engine.
//!
//! Splits failures into the three classes the displays care about:
//! local validation errors (rejected before any network call), transport
//! and remote errors (trigger rollback plus a user-visible notification),
//! and decode errors for payloads that fail their shape check.

use thiserror::Error;

use crate::models::{OrderId, OrderStatus, OrderType};

#[derive(Debug, Error)]
pub enum SyncError {
    /// The attempted status move is not in the transition graph for the
    /// order's type. Rejected before the remote call is issued.
    #[error("illegal status transition {from} -> {to} for {order_type} order")]
    IllegalTransition {
        order_type: OrderType,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A patch field that only exists on the other fulfillment variant
    /// (e.g. `delivery_address` on a dine-in order).
    #[error("field `{field}` does not apply to {order_type} orders")]
    FieldNotApplicable {
        field: &'static str,
        order_type: OrderType,
    },

    /// A patch that sets no fields; there is nothing to send.
    #[error("patch for order {0} sets no fields")]
    EmptyPatch(OrderId),

    /// A mutation for this order id is still outstanding.
    #[error("order {0} already has a mutation in flight")]
    MutationInFlight(OrderId),

    #[error("order {0} is not present in local state")]
    UnknownOrder(OrderId),

    #[error("order {order_id} has no item `{item_id}`")]
    UnknownItem { order_id: OrderId, item_id: String },

    /// Connection-level failure (unreachable host, timeout, bad URL).
    #[error("{0}")]
    Transport(String),

    /// The server answered with a non-success status. The message keeps
    /// whatever detail the error body carried.
    #[error("{0}")]
    Remote(String),

    /// A response body failed its shape check.
    #[error("invalid payload from server: {0}")]
    Decode(String),
}

impl SyncError {
    /// True for errors raised locally, before any network round-trip.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SyncError::IllegalTransition { .. }
                | SyncError::FieldNotApplicable { .. }
                | SyncError::EmptyPatch(_)
                | SyncError::MutationInFlight(_)
                | SyncError::UnknownOrder(_)
                | SyncError::UnknownItem { .. }
        )
    }
}
