//! Notification of server status changes.

use crate::domain::SharedServer;

/// Receives the servers whose alive status flipped during a probing pass.
///
/// Called synchronously by the pass that detected the change, with a
/// non-empty batch. Listeners run in registration order.
pub trait ServerStatusChangeListener: Send + Sync {
    /// Handle a batch of changed servers.
    fn server_status_changed(&self, servers: &[SharedServer]);
}

impl<F> ServerStatusChangeListener for F
where
    F: Fn(&[SharedServer]) + Send + Sync,
{
    fn server_status_changed(&self, servers: &[SharedServer]) {
        self(servers)
    }
}
