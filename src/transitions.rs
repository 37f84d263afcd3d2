//! Legal status moves for an order, branching on order type.
//!
//! This table is the single authority every surface consults, so the
//! kitchen, waiter, delivery, and management views cannot diverge on what
//! counts as a legal move. Illegal moves are rejected here, before any
//! network call, so the UI never flashes an optimistic state the server
//! would refuse.
//!
//! Graphs:
//! - in_house:  pending -> preparing -> ready -> served -> completed
//! - delivery:  pending -> preparing -> ready -> out_for_delivery -> completed
//!
//! `canceled` is reachable from every non-terminal state and is strictly
//! terminal. The only backward edge is the single-step operator-mistake
//! revert from the post-ready state back to `ready`.

use crate::error::SyncError;
use crate::models::{OrderStatus, OrderType};

/// The set of statuses an order may move to from `from`.
pub fn allowed_transitions(order_type: OrderType, from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match (order_type, from) {
        (_, Pending) => &[Preparing, Canceled],
        (_, Preparing) => &[Ready, Canceled],
        (OrderType::InHouse, Ready) => &[Served, Canceled],
        (OrderType::Delivery, Ready) => &[OutForDelivery, Canceled],
        (OrderType::InHouse, Served) => &[Completed, Ready, Canceled],
        (OrderType::Delivery, OutForDelivery) => &[Completed, Ready, Canceled],
        // Post-ready state of the other branch: unreachable for this type.
        (OrderType::InHouse, OutForDelivery) | (OrderType::Delivery, Served) => &[],
        (_, Completed) | (_, Canceled) => &[],
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Completed | OrderStatus::Canceled)
}

/// True for the one permitted backward edge (served/out_for_delivery back
/// to ready).
pub fn is_revert(from: OrderStatus, to: OrderStatus) -> bool {
    to == OrderStatus::Ready
        && matches!(from, OrderStatus::Served | OrderStatus::OutForDelivery)
}

pub fn validate_transition(
    order_type: OrderType,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), SyncError> {
    if allowed_transitions(order_type, from).contains(&to) {
        Ok(())
    } else {
        Err(SyncError::IllegalTransition {
            order_type,
            from,
            to,
        })
    }
}
