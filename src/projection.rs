//! Per-surface views of the shared order collection.
//!
//! Pure filter/sort steps: every display gets a private, derived copy of
//! the collection, so a surface mutating its own array can never corrupt
//! another surface's view. Projection never fails; malformed rows were
//! already dropped at decode time.

use std::collections::BTreeSet;
use std::fmt;

use crate::models::{Order, OrderStatus, OrderType};

/// One of the independent display contexts that views a filtered slice of
/// the order collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Surface {
    Kitchen,
    Waiter,
    Delivery,
    Management,
}

impl Surface {
    /// Backend resource segment serving this surface.
    pub fn resource(&self) -> &'static str {
        match self {
            Surface::Kitchen => "kitchen/orders",
            Surface::Waiter => "waiter/orders",
            Surface::Delivery => "delivery/orders",
            Surface::Management => "orders",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Surface::Kitchen => "kitchen",
            Surface::Waiter => "waiter",
            Surface::Delivery => "delivery",
            Surface::Management => "management",
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Surface projections
// ---------------------------------------------------------------------------

/// The live membership of a surface, filtered and sorted for display.
pub fn project(orders: &[Order], surface: Surface) -> Vec<Order> {
    match surface {
        Surface::Kitchen => kitchen_queue(orders),
        Surface::Waiter => {
            let lanes = waiter_lanes(orders);
            let mut all = lanes.ready;
            all.extend(lanes.served);
            all
        }
        Surface::Delivery => {
            let lanes = delivery_lanes(orders);
            let mut all = lanes.ready;
            all.extend(lanes.out_for_delivery);
            all
        }
        Surface::Management => management_view(orders, &OrderFilter::default()),
    }
}

/// Kitchen board: pending and preparing only. Served/completed orders are
/// excluded outright, not merely hidden. Pending group first, newest
/// first within each group.
pub fn kitchen_queue(orders: &[Order]) -> Vec<Order> {
    let mut queue: Vec<Order> = orders
        .iter()
        .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Preparing))
        .cloned()
        .collect();
    queue.sort_by(|a, b| {
        if a.status == b.status {
            b.created_at.cmp(&a.created_at)
        } else if a.status == OrderStatus::Pending {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Greater
        }
    });
    queue
}

#[derive(Debug, Clone, Default)]
pub struct WaiterLanes {
    pub ready: Vec<Order>,
    pub served: Vec<Order>,
}

/// Waiter board lanes, dine-in orders only, most recently touched first.
pub fn waiter_lanes(orders: &[Order]) -> WaiterLanes {
    WaiterLanes {
        ready: lane(orders, OrderType::InHouse, OrderStatus::Ready),
        served: lane(orders, OrderType::InHouse, OrderStatus::Served),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DeliveryLanes {
    pub ready: Vec<Order>,
    pub out_for_delivery: Vec<Order>,
}

/// Delivery board lanes, delivery orders only, most recently touched first.
pub fn delivery_lanes(orders: &[Order]) -> DeliveryLanes {
    DeliveryLanes {
        ready: lane(orders, OrderType::Delivery, OrderStatus::Ready),
        out_for_delivery: lane(orders, OrderType::Delivery, OrderStatus::OutForDelivery),
    }
}

fn lane(orders: &[Order], order_type: OrderType, status: OrderStatus) -> Vec<Order> {
    let mut lane: Vec<Order> = orders
        .iter()
        .filter(|o| o.order_type() == order_type && o.status == status)
        .cloned()
        .collect();
    lane.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    lane
}

// ---------------------------------------------------------------------------
// Order management view
// ---------------------------------------------------------------------------

/// Client-side filters for the management table.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Free-text match against id, customer name, table number, or status.
    pub search: Option<String>,
    /// Column filter: keep only these statuses (empty keeps everything).
    pub statuses: Vec<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub table_number: Option<String>,
}

/// Management table: all orders including terminal states, filtered
/// client-side over the full collection, most recently touched first.
pub fn management_view(orders: &[Order], filter: &OrderFilter) -> Vec<Order> {
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut view: Vec<Order> = orders
        .iter()
        .filter(|o| {
            if !filter.statuses.is_empty() && !filter.statuses.contains(&o.status) {
                return false;
            }
            if let Some(order_type) = filter.order_type {
                if o.order_type() != order_type {
                    return false;
                }
            }
            if let Some(table) = &filter.table_number {
                if o.fulfillment.table_number() != Some(table.as_str()) {
                    return false;
                }
            }
            match &search {
                None => true,
                Some(needle) => matches_search(o, needle),
            }
        })
        .cloned()
        .collect();
    view.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    view
}

fn matches_search(order: &Order, needle: &str) -> bool {
    order.id.to_string().contains(needle)
        || order
            .customer_name
            .as_deref()
            .is_some_and(|name| name.to_lowercase().contains(needle))
        || order
            .fulfillment
            .table_number()
            .is_some_and(|table| table.to_lowercase().contains(needle))
        || order.status.as_str().contains(needle)
}

// ---------------------------------------------------------------------------
// Board helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KitchenStats {
    pub total: usize,
    pub pending: usize,
    pub preparing: usize,
}

pub fn kitchen_stats(orders: &[Order]) -> KitchenStats {
    let queue = kitchen_queue(orders);
    KitchenStats {
        total: queue.len(),
        pending: queue
            .iter()
            .filter(|o| o.status == OrderStatus::Pending)
            .count(),
        preparing: queue
            .iter()
            .filter(|o| o.status == OrderStatus::Preparing)
            .count(),
    }
}

/// Distinct table numbers present in the collection, for the kitchen
/// filter bar.
pub fn unique_tables(orders: &[Order]) -> Vec<String> {
    let tables: BTreeSet<String> = orders
        .iter()
        .filter_map(|o| o.fulfillment.table_number())
        .map(str::to_string)
        .collect();
    tables.into_iter().collect()
}
