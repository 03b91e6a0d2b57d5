//! Answers inbound queries from the record store.
//!
//! Stateless per packet. Each question is answered on its own: one response
//! per question that has matches, no questions echoed back (RFC 6762 §6),
//! sent after a random delay so responders on the link do not collide.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use peercache_protocol::Message;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::DiscoveryConfig;
use crate::store::{RecordStore, SharedRecordStore};
use crate::transport::{Inbound, MdnsTransport};

/// A response and where it should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedResponse {
    pub message: Message,
    pub destination: SocketAddr,
}

/// Decide what to send for one inbound packet.
pub fn plan_responses(
    store: &RecordStore,
    inbound: &Inbound,
    multicast: SocketAddr,
) -> Vec<PlannedResponse> {
    let msg = &inbound.message;
    if !msg.is_query() || msg.questions.is_empty() {
        return Vec::new();
    }

    msg.questions
        .iter()
        .filter_map(|q| {
            let records = store.query(&q.name, q.query_type, q.class());
            if records.is_empty() {
                return None;
            }
            let destination = if q.unicast_response_requested() {
                inbound.source
            } else {
                multicast
            };
            debug!(
                name = %q.name,
                rtype = q.query_type,
                answers = records.len(),
                %destination,
                "answering question"
            );
            Some(PlannedResponse {
                message: Message::response(records),
                destination,
            })
        })
        .collect()
}

/// Dispatch target for the receive loop.
#[derive(Clone)]
pub struct Responder {
    store: SharedRecordStore,
    transport: MdnsTransport,
    wait: (Duration, Duration),
}

impl Responder {
    pub fn new(store: SharedRecordStore, transport: MdnsTransport, config: &DiscoveryConfig) -> Self {
        Self {
            store,
            transport,
            wait: config.response_wait(),
        }
    }

    /// Fan the packet out to listeners, then schedule any answers.
    ///
    /// Never blocks: each answer is sent from its own task after its delay.
    pub fn handle(&self, inbound: Inbound) {
        let inbound = Arc::new(inbound);
        self.transport.listeners().deliver(&inbound);

        let planned = plan_responses(&self.store.lock(), &inbound, self.transport.multicast_addr());
        for response in planned {
            let delay = self.random_delay();
            let transport = self.transport.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if transport.is_closed() {
                    return;
                }
                if let Err(e) = transport.send(&response.message, response.destination).await {
                    warn!(error = %e, destination = %response.destination, "failed to send response");
                }
            });
        }
    }

    fn random_delay(&self) -> Duration {
        let (min, max) = self.wait;
        rand::rng().random_range(min..=max)
    }
}
