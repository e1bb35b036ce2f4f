//! Shared application state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::core::provider::Provider;

/// State shared by every connection handler.
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,

    /// Providers available to each new connection
    pub providers: Vec<Arc<dyn Provider>>,

    /// Live-connection tracking for cooperative shutdown
    pub connections: ConnectionRegistry,
}

impl AppState {
    pub fn new(config: ServerConfig, providers: Vec<Arc<dyn Provider>>) -> Arc<Self> {
        Arc::new(Self {
            config,
            providers,
            connections: ConnectionRegistry::default(),
        })
    }
}

/// Registry of live client connections.
///
/// Supports exactly three operations: add, remove, and stop-all. Each
/// registered connection holds a watch receiver; `stop_all` flips every
/// sender, which ends the connection's inbound loop and triggers its normal
/// teardown path.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl ConnectionRegistry {
    /// Register a connection, returning the stop signal it must watch.
    pub fn register(&self, id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.connections
            .lock()
            .expect("connection registry lock")
            .insert(id, tx);
        rx
    }

    /// Remove a connection after it has terminated.
    pub fn deregister(&self, id: Uuid) {
        self.connections
            .lock()
            .expect("connection registry lock")
            .remove(&id);
    }

    /// Signal every live connection to stop.
    pub fn stop_all(&self) {
        let connections = self.connections.lock().expect("connection registry lock");
        for sender in connections.values() {
            let _ = sender.send(true);
        }
    }

    /// Number of currently registered connections.
    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .expect("connection registry lock")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
