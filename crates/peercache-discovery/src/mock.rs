//! In-memory network for testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use peercache_protocol::Message;
use tokio::sync::mpsc;

use crate::socket::DatagramSocket;

type Datagram = (Vec<u8>, SocketAddr);
type Script = Box<dyn FnMut(&Message, SocketAddr) -> Vec<Message> + Send>;

/// A datagram some socket on the network sent.
#[derive(Debug, Clone)]
pub struct SentDatagram {
    pub from: SocketAddr,
    pub target: SocketAddr,
    pub bytes: Vec<u8>,
    /// `None` if the bytes do not parse.
    pub message: Option<Message>,
}

struct Node {
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<Datagram>,
}

#[derive(Default)]
struct NetworkState {
    nodes: Vec<Node>,
    sent: Vec<SentDatagram>,
    script: Option<Script>,
}

/// Shared medium connecting [`MockSocket`]s.
///
/// Multicast sends reach every other socket (the sender does not hear its
/// own traffic); unicast sends reach the socket bound to the target address.
/// An optional script sees every sent message and can answer it: its replies
/// are delivered to the sender, from [`MockNetwork::SCRIPT_PEER`]. The script
/// runs with the network locked and must not call back into it.
#[derive(Clone, Default)]
pub struct MockNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetwork {
    /// Source address of scripted replies.
    pub const SCRIPT_PEER: SocketAddr = SocketAddr::V4(std::net::SocketAddrV4::new(
        std::net::Ipv4Addr::new(10, 255, 0, 1),
        53531,
    ));

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new socket with the given address.
    pub fn socket(&self, addr: SocketAddr) -> Arc<MockSocket> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().nodes.push(Node { addr, tx });
        Arc::new(MockSocket {
            addr,
            rx: tokio::sync::Mutex::new(rx),
            network: self.clone(),
        })
    }

    /// Install the reply script, replacing any previous one.
    pub fn set_script<F>(&self, script: F)
    where
        F: FnMut(&Message, SocketAddr) -> Vec<Message> + Send + 'static,
    {
        self.lock().script = Some(Box::new(script));
    }

    /// Deliver `message` to the socket at `to` as if `from` had sent it.
    pub fn inject(&self, to: SocketAddr, message: &Message, from: SocketAddr) {
        if let Ok(bytes) = message.to_bytes() {
            self.inject_bytes(to, bytes, from);
        }
    }

    /// Deliver raw bytes, well-formed or not.
    pub fn inject_bytes(&self, to: SocketAddr, bytes: Vec<u8>, from: SocketAddr) {
        for node in self.lock().nodes.iter().filter(|n| n.addr == to) {
            let _ = node.tx.send((bytes.clone(), from));
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentDatagram> {
        self.lock().sent.clone()
    }

    /// Messages sent by the socket at `from`.
    pub fn sent_by(&self, from: SocketAddr) -> Vec<SentDatagram> {
        self.lock()
            .sent
            .iter()
            .filter(|d| d.from == from)
            .cloned()
            .collect()
    }

    /// Parsed queries sent so far.
    pub fn queries(&self) -> Vec<Message> {
        self.lock()
            .sent
            .iter()
            .filter_map(|d| d.message.clone())
            .filter(Message::is_query)
            .collect()
    }

    /// Parsed responses sent so far.
    pub fn responses(&self) -> Vec<SentDatagram> {
        self.lock()
            .sent
            .iter()
            .filter(|d| d.message.as_ref().is_some_and(|m| !m.is_query()))
            .cloned()
            .collect()
    }

    fn transmit(&self, from: SocketAddr, target: SocketAddr, bytes: &[u8]) {
        let message = Message::parse(bytes).ok();
        let mut state = self.lock();
        state.sent.push(SentDatagram {
            from,
            target,
            bytes: bytes.to_vec(),
            message: message.clone(),
        });

        let multicast = target.ip().is_multicast();
        for node in &state.nodes {
            let reaches = if multicast {
                node.addr != from
            } else {
                node.addr == target
            };
            if reaches {
                let _ = node.tx.send((bytes.to_vec(), from));
            }
        }

        let replies = match (state.script.as_mut(), message) {
            (Some(script), Some(message)) => script(&message, from),
            _ => Vec::new(),
        };
        for reply in replies {
            let Ok(reply_bytes) = reply.to_bytes() else {
                continue;
            };
            for node in state.nodes.iter().filter(|n| n.addr == from) {
                let _ = node.tx.send((reply_bytes.clone(), Self::SCRIPT_PEER));
            }
        }
    }
}

/// One endpoint on a [`MockNetwork`].
pub struct MockSocket {
    addr: SocketAddr,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Datagram>>,
    network: MockNetwork,
}

impl MockSocket {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl DatagramSocket for MockSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> std::io::Result<usize> {
        self.network.transmit(self.addr, target, buf);
        Ok(buf.len())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        let Some((bytes, from)) = rx.recv().await else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "mock network gone",
            ));
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok((len, from))
    }
}
