//! The active server list shared between the balancer and its rule.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::domain::server::SharedServer;

/// Partition of the server list by probe status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerGroup {
    /// Every server, alive or not.
    All,
    /// Servers whose last probe succeeded.
    StatusUp,
    /// Servers whose last probe failed.
    StatusNotUp,
}

impl ServerGroup {
    /// Whether a server with the given alive flag belongs to this group.
    pub fn admits(self, alive: bool) -> bool {
        match self {
            Self::All => true,
            Self::StatusUp => alive,
            Self::StatusNotUp => !alive,
        }
    }
}

/// Read access to the servers a rule selects from.
pub trait ServerSource: Send + Sync {
    /// Snapshot of every server currently exposed to callers.
    fn all_servers(&self) -> Arc<Vec<SharedServer>>;

    /// Servers belonging to the given status group, in list order.
    fn server_list(&self, group: ServerGroup) -> Vec<SharedServer> {
        self.all_servers()
            .iter()
            .filter(|s| group.admits(s.is_alive()))
            .cloned()
            .collect()
    }
}

/// A lock-free list of the servers exposed to callers.
///
/// Uses `ArcSwap` so the refresh path can replace the whole list while
/// `choose()` callers keep reading the snapshot they already loaded.
#[derive(Debug, Default)]
pub struct ServerList {
    servers: ArcSwap<Vec<SharedServer>>,
}

impl ServerList {
    /// Create a list with the initial set of servers.
    pub fn new(initial: Vec<SharedServer>) -> Self {
        Self {
            servers: ArcSwap::from_pointee(initial),
        }
    }

    /// Atomically replace the entire set of servers.
    pub fn update(&self, servers: Vec<SharedServer>) {
        self.servers.store(Arc::new(servers));
    }

    /// Number of servers in the current snapshot.
    pub fn len(&self) -> usize {
        self.servers.load().len()
    }

    /// Whether the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.servers.load().is_empty()
    }
}

impl ServerSource for ServerList {
    fn all_servers(&self) -> Arc<Vec<SharedServer>> {
        self.servers.load_full()
    }
}

/// A shared reference to the server list.
pub type SharedServerList = Arc<ServerList>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::server::Server;

    fn servers(n: u16) -> Vec<SharedServer> {
        (0..n).map(|i| Arc::new(Server::new("10.0.0.1", 8000 + i))).collect()
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let list = ServerList::new(servers(2));
        let before = list.all_servers();

        list.update(servers(5));

        assert_eq!(before.len(), 2);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn test_server_groups() {
        let list = ServerList::new(servers(3));
        list.all_servers()[1].set_alive(false);

        assert_eq!(list.server_list(ServerGroup::All).len(), 3);
        assert_eq!(list.server_list(ServerGroup::StatusUp).len(), 2);

        let down = list.server_list(ServerGroup::StatusNotUp);
        assert_eq!(down.len(), 1);
        assert_eq!(down[0].port(), 8001);
    }
}
