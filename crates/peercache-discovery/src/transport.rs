//! Multicast transport: send, receive, and fan-out to listeners.
//!
//! Every parsed inbound message is delivered to every listener subscribed at
//! the moment of dispatch. Listeners do their own filtering; there is no
//! routing by content. Datagrams that fail to parse are logged and dropped.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use peercache_protocol::Message;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{DiscoveryError, SocketStep};
use crate::socket::DatagramSocket;

/// Largest datagram we accept (RFC 6762 §17).
pub const MAX_DATAGRAM: usize = 9000;

/// A parsed datagram and its sender.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub message: Message,
    pub source: SocketAddr,
}

#[derive(Debug, Default)]
struct ListenerTable {
    next_id: u64,
    senders: BTreeMap<u64, mpsc::UnboundedSender<Arc<Inbound>>>,
}

/// Registry of subscribed listeners.
#[derive(Debug, Clone, Default)]
pub struct Listeners {
    table: Arc<Mutex<ListenerTable>>,
}

impl Listeners {
    fn lock(&self) -> MutexGuard<'_, ListenerTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut table = self.lock();
        let id = table.next_id;
        table.next_id += 1;
        table.senders.insert(id, tx);
        trace!(id, "listener subscribed");
        Subscription {
            id,
            rx,
            listeners: self.clone(),
        }
    }

    fn unsubscribe(&self, id: u64) {
        if self.lock().senders.remove(&id).is_some() {
            trace!(id, "listener unsubscribed");
        }
    }

    /// Deliver to a snapshot of the current subscribers.
    ///
    /// The lock is released before sending, so a listener may subscribe or
    /// unsubscribe from inside its own handling without deadlocking.
    pub fn deliver(&self, inbound: &Arc<Inbound>) {
        let snapshot: Vec<(u64, mpsc::UnboundedSender<Arc<Inbound>>)> = self
            .lock()
            .senders
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        for (id, tx) in snapshot {
            if tx.send(Arc::clone(inbound)).is_err() {
                self.unsubscribe(id);
            }
        }
    }

    pub fn clear(&self) {
        self.lock().senders.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<Inbound>>,
    listeners: Listeners,
}

impl Subscription {
    /// Wait for the next message. `None` once the registry was cleared.
    pub async fn recv(&mut self) -> Option<Arc<Inbound>> {
        self.rx.recv().await
    }

    /// Everything delivered so far that has not been taken yet.
    pub fn drain(&mut self) -> Vec<Arc<Inbound>> {
        let mut out = Vec::new();
        while let Ok(inbound) = self.rx.try_recv() {
            out.push(inbound);
        }
        out
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.listeners.unsubscribe(self.id);
    }
}

/// The single shared mDNS socket plus its listener registry.
#[derive(Clone)]
pub struct MdnsTransport {
    socket: Arc<dyn DatagramSocket>,
    multicast: SocketAddr,
    listeners: Listeners,
    closed: Arc<AtomicBool>,
}

impl MdnsTransport {
    pub fn new(socket: Arc<dyn DatagramSocket>, multicast: SocketAddr) -> Self {
        Self {
            socket,
            multicast,
            listeners: Listeners::default(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn multicast_addr(&self) -> SocketAddr {
        self.multicast
    }

    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub fn subscribe(&self) -> Subscription {
        self.listeners.subscribe()
    }

    /// Serialise and send one datagram. No retry.
    pub async fn send(&self, msg: &Message, target: SocketAddr) -> Result<(), DiscoveryError> {
        if self.is_closed() {
            return Err(DiscoveryError::NotRunning);
        }
        let bytes = msg.to_bytes()?;
        self.socket
            .send_to(&bytes, target)
            .await
            .map_err(DiscoveryError::socket(SocketStep::Send))?;
        trace!(%target, len = bytes.len(), query = msg.is_query(), "sent message");
        Ok(())
    }

    pub async fn send_multicast(&self, msg: &Message) -> Result<(), DiscoveryError> {
        self.send(msg, self.multicast).await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Refuse further sends and drop every listener.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.listeners.clear();
        info!("mDNS transport closed");
    }

    /// Spawn the receive loop, handing each parsed message to `handler`.
    pub fn spawn_receiver<H>(&self, handler: H) -> JoinHandle<()>
    where
        H: Fn(Inbound) + Send + Sync + 'static,
    {
        let transport = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, source) = match transport.socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        if transport.is_closed() {
                            break;
                        }
                        warn!(error = %e, "mDNS receive error");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };
                if transport.is_closed() {
                    break;
                }

                match Message::parse(&buf[..len]) {
                    Ok(message) => {
                        trace!(%source, len, query = message.is_query(), "received message");
                        handler(Inbound { message, source });
                    }
                    Err(e) => {
                        debug!(%source, len, error = %e, "dropping malformed packet");
                    }
                }
            }
            debug!("mDNS receive loop finished");
        })
    }
}
