//! The broadcast hub: connection directory + group registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Payload};
use crate::errors::HubError;
use crate::ids::ConnectionId;
use crate::registry::GroupRegistry;

/// Default per-connection send queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Outcome of a [`Hub::broadcast_to_group`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members the payload was enqueued for.
    pub delivered_count: usize,
    /// Per-member failures, in member order.
    pub failed: Vec<HubError>,
}

impl BroadcastReport {
    /// Ids of the members that did not get the payload.
    pub fn failed_ids(&self) -> Vec<&ConnectionId> {
        self.failed.iter().map(HubError::connection_id).collect()
    }

    /// Size of the membership snapshot the broadcast fanned out to.
    pub fn attempted(&self) -> usize {
        self.delivered_count + self.failed.len()
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    groups: GroupRegistry,
    shut_down: bool,
}

/// Owns every live connection and every group membership.
///
/// All membership reads and writes go through one mutex. It is only held
/// while touching the maps: fan-out happens on a snapshot taken under the
/// lock, and enqueueing never waits on a receiver.
pub struct Hub {
    state: Mutex<HubState>,
    queue_capacity: usize,
}

impl Hub {
    /// Create a hub whose connections get `queue_capacity` queue slots.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Per-connection queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Register a newly accepted connection.
    ///
    /// Returns the shared handle (state `Connecting`) and the receiving end of
    /// its send queue, which the transport's writer drains. After
    /// [`Hub::shutdown`] the handle comes back already `Closing` and is never
    /// added to the directory.
    pub fn register(&self) -> (Arc<Connection>, mpsc::Receiver<Payload>) {
        let (connection, rx) = Connection::new(ConnectionId::new(), self.queue_capacity);
        let connection = Arc::new(connection);
        let total = {
            let mut state = self.state.lock();
            if state.shut_down {
                None
            } else {
                let _ = state
                    .connections
                    .insert(connection.id().clone(), Arc::clone(&connection));
                Some(state.connections.len())
            }
        };
        match total {
            Some(total) => debug!(conn_id = %connection.id(), total, "connection registered"),
            None => {
                let _ = connection.begin_close();
                debug!(conn_id = %connection.id(), "hub is shut down, connection refused");
            }
        }
        (connection, rx)
    }

    /// Add a live connection to `group`. Joining twice is a no-op.
    pub fn join(&self, group: &str, id: &ConnectionId) -> Result<(), HubError> {
        let mut state = self.state.lock();
        let live = state
            .connections
            .get(id)
            .is_some_and(|c| c.state().is_live());
        if !live {
            return Err(HubError::UnknownConnection(id.clone()));
        }
        if state.groups.add(group, id.clone()) {
            debug!(conn_id = %id, group, "joined group");
        }
        Ok(())
    }

    /// Remove a connection from `group`; succeeds whether or not it was a member.
    #[allow(clippy::unnecessary_wraps)]
    pub fn leave(&self, group: &str, id: &ConnectionId) -> Result<(), HubError> {
        if self.state.lock().groups.remove(group, id) {
            debug!(conn_id = %id, group, "left group");
        }
        Ok(())
    }

    /// Enqueue a payload for one connection without waiting for delivery.
    pub fn send_to_connection(
        &self,
        id: &ConnectionId,
        payload: impl Into<Payload>,
    ) -> Result<(), HubError> {
        let connection = self
            .connection(id)
            .ok_or_else(|| HubError::UnknownConnection(id.clone()))?;
        connection.try_enqueue(payload.into())
    }

    /// Fan a payload out to every current member of `group`.
    ///
    /// Membership is snapshotted under the lock; enqueueing happens after it
    /// is released. A missing group counts as zero members.
    pub fn broadcast_to_group(&self, group: &str, payload: impl Into<Payload>) -> BroadcastReport {
        let payload = payload.into();
        let targets: Vec<(ConnectionId, Option<Arc<Connection>>)> = {
            let state = self.state.lock();
            state
                .groups
                .members_of(group)
                .into_iter()
                .map(|id| {
                    let connection = state.connections.get(&id).cloned();
                    (id, connection)
                })
                .collect()
        };

        let mut report = BroadcastReport::default();
        for (id, connection) in targets {
            let result = match connection {
                Some(connection) => connection.try_enqueue(Arc::clone(&payload)),
                None => Err(HubError::UnknownConnection(id)),
            };
            match result {
                Ok(()) => report.delivered_count += 1,
                Err(e) => {
                    warn!(conn_id = %e.connection_id(), group, kind = e.error_kind(), "broadcast delivery failed");
                    report.failed.push(e);
                }
            }
        }

        debug!(
            group,
            delivered = report.delivered_count,
            failed = report.failed.len(),
            "broadcast to group"
        );
        report
    }

    /// Remove a connection from the directory and from every group, then mark
    /// it `Closed`. Returns `false` if it was not registered.
    ///
    /// Concurrent broadcasts that already snapshotted this connection see it
    /// refuse the payload and record a failure.
    pub fn disconnect(&self, id: &ConnectionId) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let groups = state.groups.remove_everywhere(id);
            state.connections.remove(id).map(|c| (c, groups))
        };
        match removed {
            Some((connection, groups)) => {
                connection.mark_closed();
                info!(
                    conn_id = %id,
                    groups = groups.len(),
                    age_ms = u64::try_from(connection.age().as_millis()).unwrap_or(u64::MAX),
                    "connection disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Clear the directory and the registry and ask every connection to close.
    ///
    /// Writers still flush what is already queued. The hub stays shut down:
    /// later registrations are refused. Returns how many connections were
    /// asked to close.
    pub fn shutdown(&self) -> usize {
        let connections: Vec<Arc<Connection>> = {
            let mut state = self.state.lock();
            state.shut_down = true;
            state.groups.clear();
            state.connections.drain().map(|(_, c)| c).collect()
        };
        for connection in &connections {
            let _ = connection.begin_close();
        }
        info!(closed = connections.len(), "hub shut down");
        connections.len()
    }

    /// Whether [`Hub::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Look up a registered connection.
    pub fn connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.state.lock().connections.get(id).cloned()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    /// Number of non-empty groups.
    pub fn group_count(&self) -> usize {
        self.state.lock().groups.group_count()
    }

    /// Snapshot of a group's members.
    pub fn members_of(&self, group: &str) -> BTreeSet<ConnectionId> {
        self.state.lock().groups.members_of(group)
    }

    /// Snapshot of the groups a connection belongs to.
    pub fn groups_of(&self, id: &ConnectionId) -> BTreeSet<String> {
        self.state.lock().groups.groups_of(id)
    }

    /// Whether `id` is currently a member of `group`.
    pub fn is_member(&self, group: &str, id: &ConnectionId) -> bool {
        self.state.lock().groups.contains(group, id)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
