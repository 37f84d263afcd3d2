//! REST path construction for the order resource tree.
//!
//! Paths follow `/{domain}/{system_id}/{resource}/…` with a trailing
//! slash, and each display surface owns its own collection resource
//! (`kitchen/orders`, `waiter/orders`, `delivery/orders`, plain `orders`
//! for management). Item sub-resources hang off the management order
//! path.

use crate::models::OrderId;
use crate::projection::Surface;

#[derive(Debug, Clone)]
pub struct Routes {
    domain: String,
    system_id: String,
}

impl Routes {
    pub fn new(domain: &str, system_id: &str) -> Self {
        Self {
            domain: domain.trim_matches('/').to_string(),
            system_id: system_id.trim_matches('/').to_string(),
        }
    }

    pub fn collection(&self, surface: Surface) -> String {
        format!(
            "/{}/{}/{}/",
            self.domain,
            self.system_id,
            surface.resource()
        )
    }

    pub fn order(&self, surface: Surface, id: OrderId) -> String {
        format!("{}{id}/", self.collection(surface))
    }

    pub fn items(&self, order_id: OrderId) -> String {
        format!("{}items/", self.order(Surface::Management, order_id))
    }

    pub fn item(&self, order_id: OrderId, item_id: &str) -> String {
        format!("{}{item_id}/", self.items(order_id))
    }
}
