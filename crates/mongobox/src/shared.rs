use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

use crate::{config::ServerOptions, error::Result, server::Server};

/// One instance shared by many callers through reference counting.
///
/// The instance lives as long as any caller holds the `Arc` returned by
/// [`SharedServer::acquire`]; the last holder dropping it tears it down. A
/// later `acquire` starts a fresh instance.
pub struct SharedServer {
    options: ServerOptions,
    slot: Mutex<Weak<Server>>,
}

impl SharedServer {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: options.init_only(false),
            slot: Mutex::new(Weak::new()),
        }
    }

    /// Returns the live instance, starting one if none is active.
    pub async fn acquire(&self) -> Result<Arc<Server>> {
        let mut slot = self.slot.lock().await;
        if let Some(server) = slot.upgrade()
            && server.is_active()
        {
            return Ok(server);
        }

        let server = Arc::new(Server::new(self.options.clone()).await?);
        tracing::info!(instance = %server.id(), port = server.port(), "started shared mongod");
        *slot = Arc::downgrade(&server);
        Ok(server)
    }

    /// Gives back a handle, shutting the instance down if it was the last one.
    ///
    /// Returns `true` when this call tore the instance down.
    pub async fn release(server: Arc<Server>) -> bool {
        match Arc::try_unwrap(server) {
            Ok(server) => {
                server.shutdown().await;
                true
            }
            Err(_) => false,
        }
    }
}
