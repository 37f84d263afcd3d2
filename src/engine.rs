//! Optimistic order mutation against the server-authoritative collection.
//!
//! The engine owns the local order collection and applies every mutation
//! in the same shape: validate locally, snapshot, apply optimistically,
//! confirm remotely, then either reconcile with the server's response or
//! roll back to the snapshot and emit exactly one failure notification.
//! Local state may diverge from the server only inside the in-flight
//! window of a single mutation per order; a second mutation for the same
//! id is rejected while one is outstanding.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Method;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::RemoteBackend;
use crate::cache::ResourceCache;
use crate::coordinator::FetchCoordinator;
use crate::error::SyncError;
use crate::models::{
    self, NewOrderItem, Order, OrderId, OrderItem, OrderPatch, OrderStatus,
};
use crate::projection::Surface;
use crate::routes::Routes;
use crate::transitions;

/// Notification stream consumed by display hosts.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    OrdersRefreshed { surface: Surface, count: usize },
    OrderUpdated { order_id: OrderId },
    OrderRemoved { order_id: OrderId },
    /// A mutation failed after its optimistic apply; local state has
    /// already been rolled back. Emitted exactly once per failure.
    MutationFailed { order_id: OrderId, message: String },
}

pub struct OrderEngine<B: RemoteBackend> {
    coordinator: FetchCoordinator<B>,
    routes: Routes,
    orders: Mutex<HashMap<OrderId, Order>>,
    /// Ids each board surface returned on its last fetch; a board's next
    /// fetch evicts the ids it dropped.
    board_ids: Mutex<HashMap<Surface, HashSet<OrderId>>>,
    in_flight: Mutex<HashSet<OrderId>>,
    events: broadcast::Sender<EngineEvent>,
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Removes the order id from the in-flight set when the mutation resolves,
/// whichever way it resolves.
struct FlightGuard<'a> {
    set: &'a Mutex<HashSet<OrderId>>,
    id: OrderId,
}

impl<'a> FlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<OrderId>>, id: OrderId) -> Result<Self, SyncError> {
        let mut guard = lock_recover(set);
        if !guard.insert(id) {
            return Err(SyncError::MutationInFlight(id));
        }
        Ok(Self { set, id })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        lock_recover(self.set).remove(&self.id);
    }
}

impl<B: RemoteBackend> OrderEngine<B> {
    pub fn new(backend: B, cache: Arc<ResourceCache>, routes: Routes) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            coordinator: FetchCoordinator::new(backend, cache),
            routes,
            orders: Mutex::new(HashMap::new()),
            board_ids: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            events,
        }
    }

    pub fn coordinator(&self) -> &FetchCoordinator<B> {
        &self.coordinator
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is fine; notifications are best-effort.
        let _ = self.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a surface's collection through the cache and fold it into
    /// local state.
    pub async fn load(&self, surface: Surface) -> Result<Vec<Order>, SyncError> {
        let path = self.routes.collection(surface);
        let value = self.coordinator.get(&path).await?;
        let orders = models::decode_orders(&value);
        self.apply_fetched(surface, &orders);
        self.emit(EngineEvent::OrdersRefreshed {
            surface,
            count: orders.len(),
        });
        Ok(orders)
    }

    /// Debounced forced re-fetch of a surface's collection. Returns
    /// `Ok(None)` when this trigger was superseded inside the debounce
    /// window.
    pub async fn refresh(&self, surface: Surface) -> Result<Option<Vec<Order>>, SyncError> {
        let path = self.routes.collection(surface);
        let Some(value) = self.coordinator.refresh(&path).await? else {
            return Ok(None);
        };
        let orders = models::decode_orders(&value);
        self.apply_fetched(surface, &orders);
        self.emit(EngineEvent::OrdersRefreshed {
            surface,
            count: orders.len(),
        });
        Ok(Some(orders))
    }

    /// Single-order read-through; folds the result into local state.
    pub async fn fetch_order(&self, surface: Surface, id: OrderId) -> Result<Order, SyncError> {
        let path = self.routes.order(surface, id);
        let value = self.coordinator.get(&path).await?;
        let order = models::decode_order(&value)?;
        lock_recover(&self.orders).insert(order.id, order.clone());
        Ok(order)
    }

    /// Cloned view of the local collection. Each caller gets a private
    /// copy; convergence across surfaces happens through fetches, never
    /// through shared mutable views.
    pub fn snapshot(&self) -> Vec<Order> {
        lock_recover(&self.orders).values().cloned().collect()
    }

    pub fn order(&self, id: OrderId) -> Option<Order> {
        lock_recover(&self.orders).get(&id).cloned()
    }

    /// True while a mutation for this id is outstanding; hosts disable the
    /// triggering control on this.
    pub fn is_updating(&self, id: OrderId) -> bool {
        lock_recover(&self.in_flight).contains(&id)
    }

    /// Drop a surface's cache entries so a later remount starts from a
    /// clean fetch instead of stale data.
    pub fn invalidate_surface(&self, surface: Surface) {
        let path = self.routes.collection(surface);
        self.coordinator.cache().invalidate_prefix(&path);
    }

    fn apply_fetched(&self, surface: Surface, fetched: &[Order]) {
        let fetched_ids: HashSet<OrderId> = fetched.iter().map(|o| o.id).collect();
        let mut orders = lock_recover(&self.orders);
        if surface == Surface::Management {
            // The management collection is the full set, so ids missing
            // from it are gone server-side.
            orders.retain(|id, _| fetched_ids.contains(id));
        } else {
            // Board collections are server-filtered slices. An id this
            // board returned last time but no longer does has left the
            // slice (advanced or canceled elsewhere), so its local copy is
            // stale. Ids other boards own are untouched.
            let mut owned = lock_recover(&self.board_ids);
            if let Some(previous) = owned.get(&surface) {
                for id in previous.difference(&fetched_ids) {
                    if orders.remove(id).is_some() {
                        debug!(order_id = *id, %surface, "order left the board slice");
                    }
                }
            }
            owned.insert(surface, fetched_ids);
        }
        for order in fetched {
            orders.insert(order.id, order.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Convenience wrapper for the common status-only mutation.
    pub async fn update_status(
        &self,
        surface: Surface,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, SyncError> {
        self.mutate(surface, id, OrderPatch::status(status)).await
    }

    /// Apply a partial update optimistically and confirm it remotely.
    ///
    /// Validation failures reject synchronously: no network call, no local
    /// change. Remote failures roll local state back to the pre-mutation
    /// snapshot and emit one `MutationFailed` event.
    pub async fn mutate(
        &self,
        surface: Surface,
        id: OrderId,
        patch: OrderPatch,
    ) -> Result<Order, SyncError> {
        if patch.is_empty() {
            return Err(SyncError::EmptyPatch(id));
        }
        let _guard = FlightGuard::acquire(&self.in_flight, id)?;

        let snapshot = self.order(id).ok_or(SyncError::UnknownOrder(id))?;
        if let Some(next) = patch.status {
            transitions::validate_transition(snapshot.order_type(), snapshot.status, next)?;
            if transitions::is_revert(snapshot.status, next) {
                info!(order_id = id, from = %snapshot.status, "status revert requested");
            }
        }
        let mut optimistic = snapshot.clone();
        optimistic.apply_patch(&patch)?;
        let body = serde_json::to_value(&patch)
            .map_err(|e| SyncError::Decode(format!("unserializable patch: {e}")))?;

        // Zero-latency local apply; the window until the remote call
        // resolves is the only time local state may diverge.
        lock_recover(&self.orders).insert(id, optimistic);
        debug!(order_id = id, %surface, "optimistic patch applied");

        let path = self.routes.order(surface, id);
        let outcome = self.coordinator.call(Method::PATCH, &path, Some(&body)).await;
        match outcome.and_then(|resp| models::decode_order(&resp)) {
            Ok(server_order) => {
                // The server may adjust fields the client did not send
                // (updated_at, totals); its response is authoritative.
                lock_recover(&self.orders).insert(id, server_order.clone());
                info!(order_id = id, status = %server_order.status, "order mutation confirmed");
                self.emit(EngineEvent::OrderUpdated { order_id: id });
                Ok(server_order)
            }
            Err(err) => {
                lock_recover(&self.orders).insert(id, snapshot);
                warn!(order_id = id, error = %err, "order mutation failed, rolled back");
                self.emit(EngineEvent::MutationFailed {
                    order_id: id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Optimistically append an item to an order. The item carries a UUID
    /// placeholder id until the server's response replaces it.
    pub async fn add_item(
        &self,
        order_id: OrderId,
        draft: NewOrderItem,
    ) -> Result<OrderItem, SyncError> {
        let _guard = FlightGuard::acquire(&self.in_flight, order_id)?;

        let snapshot = self.order(order_id).ok_or(SyncError::UnknownOrder(order_id))?;
        let placeholder = OrderItem {
            id: Uuid::new_v4().to_string(),
            menu_item: draft.menu_item,
            menu_item_name: draft.menu_item_name.clone(),
            quantity: draft.quantity,
            notes: draft.notes.clone(),
        };
        let placeholder_id = placeholder.id.clone();
        let body = serde_json::to_value(&draft)
            .map_err(|e| SyncError::Decode(format!("unserializable item: {e}")))?;

        {
            let mut orders = lock_recover(&self.orders);
            let mut optimistic = snapshot.clone();
            optimistic.order_items.push(placeholder);
            orders.insert(order_id, optimistic);
        }

        let path = self.routes.items(order_id);
        let outcome = self.coordinator.call(Method::POST, &path, Some(&body)).await;
        match outcome.and_then(|resp| {
            serde_json::from_value::<OrderItem>(resp)
                .map_err(|e| SyncError::Decode(e.to_string()))
        }) {
            Ok(server_item) => {
                let mut orders = lock_recover(&self.orders);
                if let Some(order) = orders.get_mut(&order_id) {
                    for item in &mut order.order_items {
                        if item.id == placeholder_id {
                            *item = server_item.clone();
                        }
                    }
                }
                self.emit(EngineEvent::OrderUpdated { order_id });
                Ok(server_item)
            }
            Err(err) => {
                lock_recover(&self.orders).insert(order_id, snapshot);
                warn!(order_id, error = %err, "item create failed, rolled back");
                self.emit(EngineEvent::MutationFailed {
                    order_id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Optimistically remove an item and confirm the removal remotely.
    pub async fn remove_item(&self, order_id: OrderId, item_id: &str) -> Result<(), SyncError> {
        let _guard = FlightGuard::acquire(&self.in_flight, order_id)?;

        let snapshot = self.order(order_id).ok_or(SyncError::UnknownOrder(order_id))?;
        if !snapshot.order_items.iter().any(|item| item.id == item_id) {
            return Err(SyncError::UnknownItem {
                order_id,
                item_id: item_id.to_string(),
            });
        }

        {
            let mut orders = lock_recover(&self.orders);
            let mut optimistic = snapshot.clone();
            optimistic.order_items.retain(|item| item.id != item_id);
            orders.insert(order_id, optimistic);
        }

        let path = self.routes.item(order_id, item_id);
        match self.coordinator.call(Method::DELETE, &path, None).await {
            Ok(_) => {
                self.emit(EngineEvent::OrderUpdated { order_id });
                Ok(())
            }
            Err(err) => {
                lock_recover(&self.orders).insert(order_id, snapshot);
                warn!(order_id, item_id, error = %err, "item delete failed, rolled back");
                self.emit(EngineEvent::MutationFailed {
                    order_id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Optimistically remove an order and confirm the removal remotely.
    pub async fn delete_order(&self, id: OrderId) -> Result<(), SyncError> {
        let _guard = FlightGuard::acquire(&self.in_flight, id)?;

        let snapshot = self.order(id).ok_or(SyncError::UnknownOrder(id))?;
        lock_recover(&self.orders).remove(&id);

        let path = self.routes.order(Surface::Management, id);
        match self.coordinator.call(Method::DELETE, &path, None).await {
            Ok(_) => {
                info!(order_id = id, "order deleted");
                self.emit(EngineEvent::OrderRemoved { order_id: id });
                Ok(())
            }
            Err(err) => {
                lock_recover(&self.orders).insert(id, snapshot);
                warn!(order_id = id, error = %err, "order delete failed, rolled back");
                self.emit(EngineEvent::MutationFailed {
                    order_id: id,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockBackend;
    use crate::projection::{kitchen_queue, waiter_lanes};
    use serde_json::{json, Value};
    use std::time::Duration;

    fn order_json(id: OrderId, order_type: &str, status: &str) -> Value {
        let mut order = json!({
            "id": id,
            "order_type": order_type,
            "status": status,
            "total_price": "25.00",
            "profit": 5,
            "order_items": [
                { "id": 900 + id, "menu_item": 3, "quantity": 1 }
            ],
            "created_at": "2026-08-20T10:00:00Z",
            "updated_at": "2026-08-20T10:05:00Z"
        });
        let obj = order.as_object_mut().expect("order object");
        if order_type == "delivery" {
            obj.insert("delivery_address".into(), json!("12 Harbor St"));
        } else {
            obj.insert("table_number".into(), json!("4"));
        }
        order
    }

    fn engine_with(
        handler: impl Fn(&Method, &str, Option<&Value>) -> Result<Value, SyncError>
            + Send
            + Sync
            + 'static,
    ) -> OrderEngine<MockBackend> {
        OrderEngine::new(
            MockBackend::new(handler),
            Arc::new(ResourceCache::new()),
            Routes::new("restaurant", "1"),
        )
    }

    async fn seed(engine: &OrderEngine<MockBackend>) {
        engine.load(Surface::Management).await.expect("seed load");
    }

    fn failed_mutations(rx: &mut broadcast::Receiver<EngineEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::MutationFailed { .. }) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn serving_an_order_moves_it_between_boards() {
        let engine = engine_with(|method, path, body| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "ready")])),
            "PATCH" => {
                assert_eq!(path, "/restaurant/1/orders/42/");
                assert_eq!(
                    body.and_then(|b| b.get("status")).cloned(),
                    Some(json!("served"))
                );
                Ok(order_json(42, "in_house", "served"))
            }
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        let updated = engine
            .update_status(Surface::Management, 42, OrderStatus::Served)
            .await
            .expect("ready -> served");
        assert_eq!(updated.status, OrderStatus::Served);

        let orders = engine.snapshot();
        assert!(
            kitchen_queue(&orders).iter().all(|o| o.id != 42),
            "kitchen must not show a served order"
        );
        assert!(
            waiter_lanes(&orders).served.iter().any(|o| o.id == 42),
            "waiter served lane must contain the order"
        );
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected_without_a_network_call() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(7, "delivery", "pending")])),
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        let err = engine
            .update_status(Surface::Delivery, 7, OrderStatus::OutForDelivery)
            .await
            .expect_err("pending must pass through preparing and ready first");
        assert!(matches!(err, SyncError::IllegalTransition { .. }));
        assert!(err.is_validation());

        assert_eq!(
            engine.coordinator().backend().count_for(&Method::PATCH),
            0,
            "no PATCH may be issued for a locally rejected transition"
        );
        let order = engine.order(7).expect("order still present");
        assert_eq!(order.status, OrderStatus::Pending, "local state untouched");
    }

    #[tokio::test]
    async fn failed_mutation_rolls_back_and_notifies_once() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(10, "in_house", "served")])),
            "PATCH" => Err(SyncError::Remote(
                "Admin backend server error (HTTP 500)".into(),
            )),
            other => panic!("unexpected method {other}"),
        });
        let mut events = engine.subscribe();
        seed(&engine).await;
        let before = engine.order(10).expect("seeded order");

        let err = engine
            .update_status(Surface::Management, 10, OrderStatus::Completed)
            .await
            .expect_err("remote failure must surface");
        assert!(matches!(err, SyncError::Remote(_)));

        assert_eq!(
            engine.order(10).expect("order present"),
            before,
            "rollback must restore the exact pre-mutation state"
        );
        assert!(!engine.is_updating(10), "in-flight flag must clear");
        assert_eq!(
            failed_mutations(&mut events),
            1,
            "exactly one failure notification"
        );
    }

    #[tokio::test]
    async fn a_response_that_fails_its_shape_check_counts_as_failure() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(10, "in_house", "ready")])),
            "PATCH" => Ok(json!({ "ok": true })),
            other => panic!("unexpected method {other}"),
        });
        let mut events = engine.subscribe();
        seed(&engine).await;
        let before = engine.order(10).expect("seeded order");

        let err = engine
            .update_status(Surface::Management, 10, OrderStatus::Served)
            .await
            .expect_err("undecodable response is not a confirmation");
        assert!(matches!(err, SyncError::Decode(_)));
        assert_eq!(engine.order(10).expect("order present"), before);
        assert_eq!(failed_mutations(&mut events), 1);
    }

    #[tokio::test]
    async fn second_mutation_for_the_same_id_is_rejected_while_one_is_in_flight() {
        let engine = Arc::new(
            OrderEngine::new(
                MockBackend::new(|method, _, _| match method.as_str() {
                    "GET" => Ok(json!([order_json(42, "in_house", "ready")])),
                    "PATCH" => Ok(order_json(42, "in_house", "served")),
                    other => panic!("unexpected method {other}"),
                })
                .with_delay(Duration::from_millis(80)),
                Arc::new(ResourceCache::new()),
                Routes::new("restaurant", "1"),
            ),
        );
        seed(&engine).await;

        let first = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .update_status(Surface::Management, 42, OrderStatus::Served)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(engine.is_updating(42));
        let err = engine
            .update_status(Surface::Management, 42, OrderStatus::Served)
            .await
            .expect_err("second mutation must be rejected while the first is outstanding");
        assert!(matches!(err, SyncError::MutationInFlight(42)));

        first
            .await
            .expect("join first mutation")
            .expect("first mutation succeeds");
        assert_eq!(
            engine.coordinator().backend().count_for(&Method::PATCH),
            1,
            "the rejected mutation must not produce a second remote call"
        );
        assert!(!engine.is_updating(42));
    }

    #[tokio::test]
    async fn fetch_order_reads_through_the_cache() {
        let engine = engine_with(|method, path, _| match (method.as_str(), path) {
            ("GET", "/restaurant/1/orders/42/") => Ok(order_json(42, "in_house", "preparing")),
            other => panic!("unexpected call {other:?}"),
        });

        let first = engine
            .fetch_order(Surface::Management, 42)
            .await
            .expect("first fetch");
        let second = engine
            .fetch_order(Surface::Management, 42)
            .await
            .expect("second fetch");
        assert_eq!(first, second);
        assert_eq!(
            engine.coordinator().backend().call_count(),
            1,
            "second fetch must be served from the cache"
        );
        assert_eq!(engine.order(42).expect("folded into local state").id, 42);
    }

    #[tokio::test]
    async fn item_add_replaces_the_placeholder_with_the_server_item() {
        let engine = engine_with(|method, path, _| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "pending")])),
            "POST" => {
                assert_eq!(path, "/restaurant/1/orders/42/items/");
                Ok(json!({ "id": 77, "menu_item": 5, "quantity": 2 }))
            }
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        let item = engine
            .add_item(
                42,
                NewOrderItem {
                    menu_item: 5,
                    menu_item_name: Some("Mint tea".into()),
                    quantity: 2,
                    notes: None,
                },
            )
            .await
            .expect("item create");
        assert_eq!(item.id, "77");

        let order = engine.order(42).expect("order present");
        assert_eq!(order.order_items.len(), 2);
        assert!(
            order.order_items.iter().any(|i| i.id == "77"),
            "placeholder must be replaced by the server id"
        );
        assert!(
            order
                .order_items
                .iter()
                .all(|i| i.id.parse::<i64>().is_ok()),
            "no UUID placeholder may survive a confirmed create"
        );
    }

    #[tokio::test]
    async fn failed_item_mutations_roll_back() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "pending")])),
            _ => Err(SyncError::Remote("Order resource not found (HTTP 404)".into())),
        });
        seed(&engine).await;
        let before = engine.order(42).expect("seeded order");

        engine
            .add_item(
                42,
                NewOrderItem {
                    menu_item: 9,
                    menu_item_name: None,
                    quantity: 1,
                    notes: None,
                },
            )
            .await
            .expect_err("create fails");
        assert_eq!(engine.order(42).expect("order present"), before);

        let item_id = before.order_items[0].id.clone();
        engine
            .remove_item(42, &item_id)
            .await
            .expect_err("delete fails");
        assert_eq!(engine.order(42).expect("order present"), before);
    }

    #[tokio::test]
    async fn removing_a_missing_item_is_a_local_error() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "pending")])),
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        let err = engine
            .remove_item(42, "no-such-item")
            .await
            .expect_err("unknown item");
        assert!(matches!(err, SyncError::UnknownItem { .. }));
        assert_eq!(
            engine.coordinator().backend().count_for(&Method::DELETE),
            0,
            "no network call for a locally rejected item delete"
        );
    }

    #[tokio::test]
    async fn delete_order_removes_locally_and_rolls_back_on_failure() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([
                order_json(1, "in_house", "completed"),
                order_json(2, "in_house", "pending"),
            ])),
            "DELETE" => Ok(Value::Null),
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        engine.delete_order(1).await.expect("delete");
        assert!(engine.order(1).is_none());
        assert!(engine.order(2).is_some());

        let failing = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(3, "in_house", "pending")])),
            _ => Err(SyncError::Remote("Admin backend server error (HTTP 503)".into())),
        });
        seed(&failing).await;
        failing.delete_order(3).await.expect_err("delete fails");
        assert!(
            failing.order(3).is_some(),
            "failed delete must restore the order locally"
        );
    }

    #[tokio::test]
    async fn management_load_prunes_orders_gone_server_side() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let second_pass = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second_pass);
        let engine = engine_with(move |method, _, _| match method.as_str() {
            "GET" => {
                if flag.load(Ordering::SeqCst) {
                    Ok(json!([order_json(2, "in_house", "pending")]))
                } else {
                    Ok(json!([
                        order_json(1, "in_house", "pending"),
                        order_json(2, "in_house", "pending"),
                    ]))
                }
            }
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;
        assert!(engine.order(1).is_some());

        second_pass.store(true, Ordering::SeqCst);
        engine.invalidate_surface(Surface::Management);
        engine.load(Surface::Management).await.expect("reload");
        assert!(engine.order(1).is_none(), "missing id must be pruned");
        assert!(engine.order(2).is_some());
    }

    #[tokio::test]
    async fn board_refetch_evicts_orders_that_left_its_slice() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let second_pass = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&second_pass);
        let engine = engine_with(move |method, path, _| match (method.as_str(), path) {
            ("GET", "/restaurant/1/kitchen/orders/") => {
                if flag.load(Ordering::SeqCst) {
                    // Order 1 was served by another terminal; the kitchen
                    // slice no longer returns it.
                    Ok(json!([]))
                } else {
                    Ok(json!([order_json(1, "in_house", "pending")]))
                }
            }
            ("GET", "/restaurant/1/delivery/orders/") => {
                Ok(json!([order_json(2, "delivery", "preparing")]))
            }
            other => panic!("unexpected call {other:?}"),
        });
        engine.load(Surface::Kitchen).await.expect("kitchen load");
        engine.load(Surface::Delivery).await.expect("delivery load");
        assert!(!kitchen_queue(&engine.snapshot()).is_empty());

        second_pass.store(true, Ordering::SeqCst);
        engine
            .refresh(Surface::Kitchen)
            .await
            .expect("kitchen refetch")
            .expect("not superseded");
        assert!(
            kitchen_queue(&engine.snapshot()).is_empty(),
            "an order the kitchen slice stopped returning must leave the board"
        );
        assert!(engine.order(1).is_none(), "stale copy must be evicted");
        assert!(
            engine.order(2).is_some(),
            "a kitchen refetch must not touch orders the delivery board owns"
        );
    }

    #[tokio::test]
    async fn empty_patch_is_rejected_without_a_network_call() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "pending")])),
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;
        let mut rx = engine.subscribe();

        let err = engine
            .mutate(Surface::Management, 42, OrderPatch::default())
            .await
            .expect_err("a patch with no fields has nothing to send");
        assert!(matches!(err, SyncError::EmptyPatch(42)));
        assert!(err.is_validation());

        assert_eq!(engine.coordinator().backend().count_for(&Method::PATCH), 0);
        assert_eq!(failed_mutations(&mut rx), 0, "local rejection is not a mutation failure");
        assert!(!engine.is_updating(42));
    }

    #[tokio::test]
    async fn patching_a_delivery_field_on_a_dine_in_order_is_rejected_locally() {
        let engine = engine_with(|method, _, _| match method.as_str() {
            "GET" => Ok(json!([order_json(42, "in_house", "pending")])),
            other => panic!("unexpected method {other}"),
        });
        seed(&engine).await;

        let err = engine
            .mutate(
                Surface::Management,
                42,
                OrderPatch {
                    delivery_address: Some("12 Harbor St".into()),
                    ..OrderPatch::default()
                },
            )
            .await
            .expect_err("field does not apply");
        assert!(matches!(err, SyncError::FieldNotApplicable { .. }));
        assert_eq!(engine.coordinator().backend().count_for(&Method::PATCH), 0);
    }
}
