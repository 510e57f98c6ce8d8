//! Per-endpoint session memoization
//!
//! Each endpoint index is dialed at most once per engine. The dial runs on
//! its own task so a lookup that gives up on it (or is dropped) does not
//! cancel the handshake; later lookups await the same shared result.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::debug;

use super::connection::{open, Connection};
use crate::endpoints::EndpointPool;
use crate::types::StreamEvent;

const EVENT_BUFFER: usize = 256;

type Dial = Shared<BoxFuture<'static, Arc<Connection>>>;

struct Slot {
    connection: Arc<Connection>,
    dial: Dial,
    abort: AbortHandle,
}

pub struct ConnectionManager {
    pool: Arc<EndpointPool>,
    slots: Mutex<Vec<Option<Slot>>>,
    events: broadcast::Sender<StreamEvent>,
    allow_no_full_history: bool,
}

impl ConnectionManager {
    pub fn new(pool: Arc<EndpointPool>, allow_no_full_history: bool) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let slots = (0..pool.len()).map(|_| None).collect();
        Self {
            pool,
            slots: Mutex::new(slots),
            events,
            allow_no_full_history,
        }
    }

    /// Validated transactions seen on any session of this engine
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Session for `index`, dialing it on first use
    ///
    /// `None` when the index is out of range, or the endpoint was
    /// invalidated before it was ever dialed.
    pub async fn connect(&self, index: usize) -> Option<Arc<Connection>> {
        let dial = {
            let mut slots = self.slots.lock();
            match slots.get(index)? {
                Some(slot) => slot.dial.clone(),
                None => {
                    if !self.pool.is_valid(index) {
                        return None;
                    }
                    let url = self.pool.url(index)?;
                    let connection = Arc::new(Connection::new(index, url));
                    let task = tokio::spawn(open(
                        connection.clone(),
                        self.pool.clone(),
                        self.events.clone(),
                        self.allow_no_full_history,
                    ));
                    let abort = task.abort_handle();
                    let fallback = connection.clone();
                    let dial: Dial = async move {
                        match task.await {
                            Ok(connection) => connection,
                            Err(_) => fallback,
                        }
                    }
                    .boxed()
                    .shared();
                    slots[index] = Some(Slot {
                        connection,
                        dial: dial.clone(),
                        abort,
                    });
                    dial
                }
            }
        };
        Some(dial.await)
    }

    /// Session for `index` if one was ever dialed
    pub fn connection(&self, index: usize) -> Option<Arc<Connection>> {
        self.slots
            .lock()
            .get(index)
            .and_then(|slot| slot.as_ref().map(|s| s.connection.clone()))
    }

    /// True once no endpoint can still produce an answer
    pub fn all_closed(&self) -> bool {
        self.slots.lock().iter().enumerate().all(|(index, slot)| match slot {
            Some(slot) => slot.connection.state().is_closed(),
            None => !self.pool.is_valid(index),
        })
    }

    /// Close every session and cancel dials in flight
    pub fn close_all(&self) {
        let slots: Vec<Slot> = self.slots.lock().iter_mut().filter_map(Option::take).collect();
        for slot in slots {
            debug!(url = %slot.connection.url(), "Closing connection");
            slot.abort.abort();
            slot.connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::EndpointStatus;
    use crate::streaming::connection::ConnectionState;

    fn pool(urls: &[&str]) -> Arc<EndpointPool> {
        let urls: Vec<String> = urls.iter().map(|s| s.to_string()).collect();
        Arc::new(EndpointPool::new(&urls, 100, 1000).unwrap())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_invalidated() {
        let pool = pool(&["ws://127.0.0.1:1"]);
        let manager = ConnectionManager::new(pool.clone(), false);

        let conn = manager.connect(0).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Errored);
        assert_eq!(pool.status(0), Some(EndpointStatus::Unreachable));
        assert!(manager.all_closed());

        let again = manager.connect(0).await.unwrap();
        assert!(Arc::ptr_eq(&conn, &again));
    }

    #[tokio::test]
    async fn test_invalid_endpoint_not_dialed() {
        let pool = pool(&["ws://127.0.0.1:1", "ws://127.0.0.1:2"]);
        pool.invalidate(1, EndpointStatus::InvalidHistory);
        let manager = ConnectionManager::new(pool, false);

        assert!(manager.connect(1).await.is_none());
        assert!(manager.connect(5).await.is_none());
        assert!(manager.connection(1).is_none());
        assert!(!manager.all_closed());
    }

    #[tokio::test]
    async fn test_close_all_clears_slots() {
        let pool = pool(&["ws://127.0.0.1:1"]);
        let manager = ConnectionManager::new(pool, false);
        let conn = manager.connect(0).await.unwrap();

        manager.close_all();
        assert!(manager.connection(0).is_none());
        assert!(conn.state().is_closed());
    }
}
