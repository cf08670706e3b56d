use super::{Order, OrderRepository, OrderStatus};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory order store.
///
/// Uses `Arc<RwLock<HashMap<u64, Order>>>` so clones share the same orders.
/// Used by tests and by the service when no database is configured.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<u64, Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<F>(&self, id: u64, f: F) -> AppResult<()>
    where
        F: FnOnce(&mut Order) + Send,
    {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("Order", id))?;
        f(order);
        order.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: u64) -> AppResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id).cloned())
    }

    async fn insert(&self, order: &Order) -> AppResult<Order> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(AppError::conflict(format!(
                "Order '{}' already exists",
                order.id
            )));
        }
        orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn update_meta(&self, id: u64, entries: &[(&str, &str)]) -> AppResult<()> {
        let entries: Vec<(String, String)> = entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        self.modify(id, move |order| order.meta.extend(entries)).await
    }

    async fn set_status(&self, id: u64, status: OrderStatus) -> AppResult<()> {
        self.modify(id, move |order| order.status = status).await
    }

    async fn set_payment_method(&self, id: u64, payment_method: &str) -> AppResult<()> {
        let payment_method = payment_method.to_string();
        self.modify(id, move |order| order.payment_method = Some(payment_method))
            .await
    }

    async fn add_note(&self, id: u64, note: &str) -> AppResult<()> {
        let note = note.to_string();
        self.modify(id, move |order| order.notes.push(note)).await
    }
}
