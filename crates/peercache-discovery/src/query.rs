//! One-shot and multi-answer queries with fixed-round retries.

use std::time::Duration;

use peercache_protocol::{Message, CLASS_IN, TYPE_A, TYPE_PTR, TYPE_SRV};
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::session::QuerySession;
use crate::transport::MdnsTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Keep collecting for every round instead of stopping at the first
    /// answer.
    pub multiple_responses: bool,
    pub round_timeout: Duration,
    /// Rounds after the first. `0` means a single send.
    pub num_retries: u32,
}

impl QueryOptions {
    /// Collect answers from every responder over all rounds.
    pub fn multiple(config: &DiscoveryConfig) -> Self {
        Self {
            multiple_responses: true,
            round_timeout: config.query_round_timeout(),
            num_retries: config.query_retries,
        }
    }

    /// Stop at the first round that produced an answer.
    pub fn single(config: &DiscoveryConfig) -> Self {
        Self {
            multiple_responses: false,
            ..Self::multiple(config)
        }
    }
}

/// Send `(name, rtype, class)` up to `num_retries + 1` times and collect
/// every matching response.
///
/// An empty result means nobody answered; it is not an error.
pub async fn query_for_responses(
    transport: &MdnsTransport,
    name: &str,
    rtype: u16,
    class: u16,
    options: QueryOptions,
) -> Result<Vec<Message>, DiscoveryError> {
    let mut session = QuerySession::open(transport, name, rtype, class);
    let query = Message::query(session.question());

    for _ in 0..=options.num_retries {
        if !session.begin_round() {
            break;
        }
        transport.send_multicast(&query).await?;
        tokio::time::sleep(options.round_timeout).await;

        session.collect();
        if !options.multiple_responses && !session.accumulated().is_empty() {
            session.resolve();
        }
    }

    debug!(
        name,
        rtype,
        rounds = session.rounds(),
        responses = session.accumulated().len(),
        "query finished"
    );
    Ok(session.finish())
}

/// PTR query for every instance of `service_type`.
pub async fn query_for_service_instances(
    transport: &MdnsTransport,
    service_type: &str,
    options: QueryOptions,
) -> Result<Vec<Message>, DiscoveryError> {
    query_for_responses(transport, service_type, TYPE_PTR, CLASS_IN, options).await
}

/// SRV query for one instance.
pub async fn query_for_instance_info(
    transport: &MdnsTransport,
    instance_name: &str,
    options: QueryOptions,
) -> Result<Vec<Message>, DiscoveryError> {
    query_for_responses(transport, instance_name, TYPE_SRV, CLASS_IN, options).await
}

/// A query for a host name.
pub async fn query_for_ip_address(
    transport: &MdnsTransport,
    domain_name: &str,
    options: QueryOptions,
) -> Result<Vec<Message>, DiscoveryError> {
    query_for_responses(transport, domain_name, TYPE_A, CLASS_IN, options).await
}
