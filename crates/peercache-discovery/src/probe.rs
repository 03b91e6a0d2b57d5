//! Probing a name before claiming it (RFC 6762 §8.1).
//!
//! Silence means the name is free. Any response answering the probe means it
//! is taken, and probing stops at once.

use std::time::Duration;

use peercache_protocol::Message;
use rand::Rng;
use tracing::{debug, info};

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::session::QuerySession;
use crate::transport::MdnsTransport;

/// Result of a completed probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Nobody answered. The name may be claimed.
    Free,
    /// Someone already holds the name.
    Taken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTiming {
    pub count: u32,
    pub interval: Duration,
    /// Upper bound of the random delay before the first probe.
    pub initial_delay_max: Duration,
}

impl ProbeTiming {
    pub fn from_config(config: &DiscoveryConfig) -> Self {
        Self {
            count: config.probe_count,
            interval: config.probe_interval(),
            initial_delay_max: config.probe_initial_delay_max(),
        }
    }

    fn delay_before(&self, round: u32) -> Duration {
        if round == 0 {
            rand::rng().random_range(Duration::ZERO..=self.initial_delay_max)
        } else {
            self.interval
        }
    }
}

/// Probe `(name, rtype, class)` `timing.count` times.
pub async fn issue_probe(
    transport: &MdnsTransport,
    name: &str,
    rtype: u16,
    class: u16,
    timing: ProbeTiming,
) -> Result<ProbeOutcome, DiscoveryError> {
    let mut session = QuerySession::open(transport, name, rtype, class);
    let probe = Message::query(session.question());

    for round in 0..timing.count {
        if !session.begin_round() {
            break;
        }
        tokio::time::sleep(timing.delay_before(round)).await;
        transport.send_multicast(&probe).await?;
        debug!(name, round, "probe sent");

        tokio::time::sleep(timing.interval).await;
        if session.collect() > 0 {
            session.resolve();
            info!(name, round, "name already taken");
            return Ok(ProbeOutcome::Taken);
        }
    }

    debug!(name, rounds = session.rounds(), "name is free");
    Ok(ProbeOutcome::Free)
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use peercache_protocol::{ResourceRecord, CACHE_FLUSH_BIT, CLASS_IN, TYPE_A, TYPE_ANY};

    use super::*;
    use crate::engine::Engine;
    use crate::mock::MockNetwork;

    fn local() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 53531))
    }

    fn engine(net: &MockNetwork) -> Engine {
        let mut engine = Engine::new(DiscoveryConfig::default());
        engine.start_with_socket(net.socket(local())).unwrap();
        engine
    }

    /// Answer the `nth` query (1-based) claiming `host.local`.
    fn answer_query(net: &MockNetwork, nth: u32) {
        let seen = Arc::new(AtomicU32::new(0));
        net.set_script(move |msg, _| {
            if !msg.is_query() {
                return Vec::new();
            }
            if seen.fetch_add(1, Ordering::SeqCst) + 1 == nth {
                vec![Message::response(vec![ResourceRecord::a(
                    "host.local",
                    Ipv4Addr::new(10, 0, 0, 9),
                    120,
                )])]
            } else {
                Vec::new()
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn silence_means_free() {
        let net = MockNetwork::new();
        let engine = engine(&net);
        let start = tokio::time::Instant::now();

        let outcome = engine
            .issue_probe("host.local", TYPE_ANY, CLASS_IN)
            .await
            .unwrap();

        assert_eq!(outcome, ProbeOutcome::Free);
        assert_eq!(net.queries().len(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1250), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1500), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn response_after_first_round_stops_probing() {
        let net = MockNetwork::new();
        answer_query(&net, 1);
        let engine = engine(&net);

        let outcome = engine
            .issue_probe("host.local", TYPE_ANY, CLASS_IN)
            .await
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Taken);

        // rounds 2 and 3 never happen, even later
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(net.queries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn response_in_second_round_is_still_taken() {
        let net = MockNetwork::new();
        answer_query(&net, 2);
        let engine = engine(&net);

        let outcome = engine
            .issue_probe("host.local", TYPE_ANY, CLASS_IN)
            .await
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Taken);
        assert_eq!(net.queries().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_flush_answer_still_means_taken() {
        let net = MockNetwork::new();
        net.set_script(|msg, _| {
            if msg.is_query() {
                vec![Message::response(vec![ResourceRecord::a(
                    "host.local",
                    Ipv4Addr::new(10, 0, 0, 9),
                    120,
                )
                .with_class(CACHE_FLUSH_BIT | CLASS_IN)])]
            } else {
                Vec::new()
            }
        });
        let engine = engine(&net);

        let outcome = engine
            .issue_probe("host.local", TYPE_A, CLASS_IN)
            .await
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Taken);
    }

    #[tokio::test(start_paused = true)]
    async fn unrelated_answers_do_not_count() {
        let net = MockNetwork::new();
        net.set_script(|msg, _| {
            if msg.is_query() {
                vec![Message::response(vec![ResourceRecord::a(
                    "someone-else.local",
                    Ipv4Addr::new(10, 0, 0, 9),
                    120,
                )])]
            } else {
                Vec::new()
            }
        });
        let engine = engine(&net);

        let outcome = engine
            .issue_probe("host.local", TYPE_ANY, CLASS_IN)
            .await
            .unwrap();
        assert_eq!(outcome, ProbeOutcome::Free);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_unsubscribes_when_done() {
        let net = MockNetwork::new();
        let engine = engine(&net);
        engine
            .issue_probe("host.local", TYPE_ANY, CLASS_IN)
            .await
            .unwrap();
        assert_eq!(engine.listener_count(), 0);
    }
}
