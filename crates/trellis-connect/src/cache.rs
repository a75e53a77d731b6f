//! Per-instance connection cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::connect::{BindingId, Connection};
use crate::error::Result;
use crate::factory::ConnectorRegistry;
use crate::params::ConnectParams;

/// Connections resolved by one job instance, keyed by binding.
///
/// The lock is held while a binding resolves, so concurrent first reads of
/// the same binding wait for the first one and share its connection. At most
/// one connector is ever built per binding. Failed resolutions are not
/// stored; the next read tries again.
pub struct ConnectionCache {
    registry: Arc<ConnectorRegistry>,
    entries: Mutex<HashMap<BindingId, Arc<Connection>>>,
}

impl ConnectionCache {
    pub fn new(registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            registry,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ConnectorRegistry> {
        &self.registry
    }

    /// The cached connection for `id`, resolving `params` on a miss.
    pub fn get_or_resolve(&self, id: BindingId, params: &ConnectParams) -> Result<Arc<Connection>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(connection) = entries.get(&id) {
            return Ok(connection.clone());
        }
        debug!("Resolving {} on first access", id);
        let connection = Arc::new(self.registry.resolve(params)?);
        entries.insert(id, connection.clone());
        Ok(connection)
    }

    pub fn get(&self, id: BindingId) -> Option<Arc<Connection>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn contains(&self, id: BindingId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("len", &self.len())
            .finish()
    }
}
