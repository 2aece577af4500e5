// src/services/invalidation.rs
//
// Aviso de "telas desatualizadas" para a camada de apresentação. É um efeito
// colateral: enviar sem ninguém ouvindo não é erro.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum View {
    Sales,
    Purchases,
    Movements,
    Inventory,
    Warehouses,
    Categories,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidationEvent {
    pub views: Vec<View>,
}

#[derive(Clone)]
pub struct Invalidation {
    sender: broadcast::Sender<InvalidationEvent>,
}

impl Invalidation {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationEvent> {
        self.sender.subscribe()
    }

    pub fn notify(&self, views: &[View]) {
        let receivers = self.sender.send(InvalidationEvent { views: views.to_vec() }).unwrap_or(0);
        tracing::debug!(?views, receivers, "Views invalidadas");
    }
}

impl Default for Invalidation {
    fn default() -> Self {
        Self::new(64)
    }
}
