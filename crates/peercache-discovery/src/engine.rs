//! The discovery engine: one socket, one record store, every operation.

use std::net::SocketAddr;
use std::sync::Arc;

use peercache_protocol::Message;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::browse::{self, BrowseOptions, ResolvedService};
use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::interfaces::{InterfaceSource, SystemInterfaces};
use crate::probe::{self, ProbeOutcome, ProbeTiming};
use crate::query::{self, QueryOptions};
use crate::register::{self, Registration, RegistrationState, ServiceAdvert};
use crate::responder::Responder;
use crate::socket::{open_multicast_socket, DatagramSocket};
use crate::store::SharedRecordStore;
use crate::transport::MdnsTransport;

struct Running {
    transport: MdnsTransport,
    receiver: JoinHandle<()>,
}

/// Owns the transport and the record store for the life of the process.
///
/// Operations take `&self` and may run concurrently; each keeps its own
/// listener. `stop` (or dropping the engine) closes the socket, so timers
/// still pending inside earlier operations find the transport closed and do
/// nothing.
pub struct Engine {
    config: DiscoveryConfig,
    store: SharedRecordStore,
    interfaces: Arc<dyn InterfaceSource>,
    running: Option<Running>,
}

impl Engine {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            store: SharedRecordStore::new(),
            interfaces: Arc::new(SystemInterfaces),
            running: None,
        }
    }

    /// Use `interfaces` instead of the host's when building A records.
    #[must_use]
    pub fn with_interfaces(mut self, interfaces: Arc<dyn InterfaceSource>) -> Self {
        self.interfaces = interfaces;
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedRecordStore {
        &self.store
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Open the multicast socket and start answering.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        if self.is_running() {
            return Err(DiscoveryError::AlreadyRunning);
        }
        let socket = open_multicast_socket(&self.config)?;
        self.start_with_socket(Arc::new(socket))
    }

    /// Start on an already opened socket.
    pub fn start_with_socket(&mut self, socket: Arc<dyn DatagramSocket>) -> Result<(), DiscoveryError> {
        if self.is_running() {
            return Err(DiscoveryError::AlreadyRunning);
        }
        let multicast = SocketAddr::V4(self.config.multicast_addr());
        let transport = MdnsTransport::new(socket, multicast);
        let responder = Responder::new(self.store.clone(), transport.clone(), &self.config);
        let receiver = transport.spawn_receiver(move |inbound| responder.handle(inbound));

        info!(%multicast, "discovery engine started");
        self.running = Some(Running {
            transport,
            receiver,
        });
        Ok(())
    }

    /// Close the socket, drop every listener and forget every record.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.receiver.abort();
        running.transport.close();
        self.store.clear_all();
        info!("discovery engine stopped");
    }

    fn transport(&self) -> Result<&MdnsTransport, DiscoveryError> {
        self.running
            .as_ref()
            .map(|r| &r.transport)
            .ok_or(DiscoveryError::NotRunning)
    }

    /// Listeners currently subscribed. Zero when stopped.
    pub fn listener_count(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.transport.listeners().len())
    }

    pub async fn issue_probe(
        &self,
        name: &str,
        rtype: u16,
        class: u16,
    ) -> Result<ProbeOutcome, DiscoveryError> {
        let timing = ProbeTiming::from_config(&self.config);
        probe::issue_probe(self.transport()?, name, rtype, class, timing).await
    }

    /// Probe the host and the instance, then publish and announce them.
    ///
    /// On a conflict nothing is added to the store.
    pub async fn register(&self, advert: &ServiceAdvert) -> Result<Registration, DiscoveryError> {
        let transport = self.transport()?;
        let timing = ProbeTiming::from_config(&self.config);
        let srv_name = advert.srv_name();

        let mut state = RegistrationState::Idle.begin();
        while !state.is_terminal() {
            register::log_state(advert, state);
            let name = match state {
                RegistrationState::ProbingHost => advert.host.as_str(),
                _ => srv_name.as_str(),
            };
            let outcome = probe::issue_probe(
                transport,
                name,
                peercache_protocol::TYPE_ANY,
                peercache_protocol::CLASS_IN,
                timing,
            )
            .await?;
            state = state.advance(outcome);
        }
        register::log_state(advert, state);
        if let RegistrationState::Failed(conflict) = state {
            return Err(register::conflict_error(conflict, advert));
        }

        let interfaces = self
            .interfaces
            .ipv4_interfaces()
            .map_err(DiscoveryError::Interfaces)?;
        if interfaces.is_empty() {
            return Err(DiscoveryError::NoInterfaces);
        }
        let records = advert.records(&interfaces, self.config.record_ttl);
        for record in &records {
            self.store.add_record(record.clone());
        }
        debug!(records = records.len(), "records published");

        register::announce(
            transport,
            records,
            self.config.announce_count,
            self.config.announce_interval(),
        )
        .await?;
        Ok(Registration::from_advert(advert))
    }

    pub async fn query_for_responses(
        &self,
        name: &str,
        rtype: u16,
        class: u16,
        options: QueryOptions,
    ) -> Result<Vec<Message>, DiscoveryError> {
        query::query_for_responses(self.transport()?, name, rtype, class, options).await
    }

    pub async fn query_for_service_instances(
        &self,
        service_type: &str,
    ) -> Result<Vec<Message>, DiscoveryError> {
        let options = QueryOptions::multiple(&self.config);
        query::query_for_service_instances(self.transport()?, service_type, options).await
    }

    pub async fn query_for_instance_info(
        &self,
        instance_name: &str,
    ) -> Result<Vec<Message>, DiscoveryError> {
        let options = QueryOptions::single(&self.config);
        query::query_for_instance_info(self.transport()?, instance_name, options).await
    }

    pub async fn query_for_ip_address(&self, domain_name: &str) -> Result<Vec<Message>, DiscoveryError> {
        let options = QueryOptions::single(&self.config);
        query::query_for_ip_address(self.transport()?, domain_name, options).await
    }

    pub async fn browse_service_instances(
        &self,
        service_type: &str,
    ) -> Result<Vec<ResolvedService>, DiscoveryError> {
        let options = BrowseOptions {
            instances: QueryOptions::multiple(&self.config),
            lookup: QueryOptions::single(&self.config),
        };
        browse::browse_service_instances(self.transport()?, service_type, options).await
    }

    pub async fn resolve_service(&self, instance_name: &str) -> Result<ResolvedService, DiscoveryError> {
        let options = QueryOptions::single(&self.config);
        browse::resolve_service(self.transport()?, instance_name, options).await
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use peercache_protocol::{Question, RecordData, ResourceRecord, CLASS_IN, TYPE_A, TYPE_PTR, TYPE_SRV};

    use super::*;
    use crate::error::SocketStep;
    use crate::interfaces::StaticInterfaces;
    use crate::mock::MockNetwork;

    fn addr(last: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last], 53531))
    }

    fn started(net: &MockNetwork, last: u8) -> Engine {
        let mut engine = Engine::new(DiscoveryConfig::default()).with_interfaces(Arc::new(
            StaticInterfaces::single("eth0", Ipv4Addr::new(10, 0, 0, last)),
        ));
        engine.start_with_socket(net.socket(addr(last))).unwrap();
        engine
    }

    fn advert(instance: &str) -> ServiceAdvert {
        ServiceAdvert {
            host: "laptop.local".to_string(),
            instance: instance.to_string(),
            service_type: "_pagecache._tcp".to_string(),
            port: 8081,
        }
    }

    /// A peer population answering browse traffic: three instances, the
    /// second of which never answers its SRV query.
    fn three_peers(net: &MockNetwork) {
        net.set_script(|msg, _| {
            if !msg.is_query() {
                return Vec::new();
            }
            let q = &msg.questions[0];
            let answer = match (q.query_type, q.name.as_str()) {
                (TYPE_PTR, "_pagecache._tcp") => ["one", "two", "three"]
                    .iter()
                    .map(|i| {
                        ResourceRecord::ptr("_pagecache._tcp", format!("{i}._pagecache._tcp.local"), 120)
                    })
                    .collect(),
                (TYPE_SRV, "one._pagecache._tcp.local") => vec![ResourceRecord::srv(
                    q.name.clone(),
                    0,
                    0,
                    9001,
                    "one.local",
                    120,
                )],
                (TYPE_SRV, "three._pagecache._tcp.local") => vec![ResourceRecord::srv(
                    q.name.clone(),
                    0,
                    0,
                    9003,
                    "three.local",
                    120,
                )],
                (TYPE_A, "one.local") => {
                    vec![ResourceRecord::a("one.local", Ipv4Addr::new(10, 1, 0, 1), 120)]
                }
                (TYPE_A, "three.local") => {
                    vec![ResourceRecord::a("three.local", Ipv4Addr::new(10, 1, 0, 3), 120)]
                }
                _ => return Vec::new(),
            };
            vec![Message::response(answer)]
        });
    }

    #[tokio::test(start_paused = true)]
    async fn register_publishes_and_announces() {
        let net = MockNetwork::new();
        let engine = started(&net, 1);

        let reg = engine.register(&advert("alice")).await.unwrap();
        assert_eq!(reg.service_name, "alice");
        assert_eq!(reg.service_type, "_pagecache._tcp");
        assert_eq!(reg.domain, "local");
        assert_eq!(reg.port, 8081);

        // 3 host probes, 3 instance probes, then the first announcement
        let probes = net.queries();
        assert_eq!(probes.len(), 6);
        assert!(probes[..3].iter().all(|m| m.questions[0].name == "laptop.local"));
        assert!(probes[3..]
            .iter()
            .all(|m| m.questions[0].name == "alice._pagecache._tcp.local"));

        let announced = net.responses();
        assert_eq!(announced.len(), 1);
        let answers = &announced[0].message.as_ref().unwrap().answers;
        assert_eq!(answers.len(), 3);
        assert_eq!(engine.store().lock().len(), 3);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(net.responses().len(), 2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(net.responses().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn taken_host_fails_without_publishing() {
        let net = MockNetwork::new();
        net.set_script(|msg, _| {
            if msg.is_query() && msg.questions[0].name == "laptop.local" {
                vec![Message::response(vec![ResourceRecord::a(
                    "laptop.local",
                    Ipv4Addr::new(10, 0, 0, 200),
                    120,
                )])]
            } else {
                Vec::new()
            }
        });
        let engine = started(&net, 1);

        let err = engine.register(&advert("alice")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::HostTaken(ref h) if h == "laptop.local"));
        assert_eq!(err.to_string(), "host taken: laptop.local");
        assert!(engine.store().lock().is_empty());
        assert_eq!(net.queries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn taken_instance_fails_without_publishing() {
        let net = MockNetwork::new();
        net.set_script(|msg, _| {
            if msg.is_query() && msg.questions[0].name == "alice._pagecache._tcp.local" {
                vec![Message::response(vec![ResourceRecord::srv(
                    "alice._pagecache._tcp.local",
                    0,
                    0,
                    1,
                    "elsewhere.local",
                    120,
                )])]
            } else {
                Vec::new()
            }
        });
        let engine = started(&net, 1);

        let err = engine.register(&advert("alice")).await.unwrap_err();
        assert_eq!(err.to_string(), "instance taken: alice");
        assert!(engine.store().lock().is_empty());
        assert!(net.responses().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_engine_sees_the_first_as_taken() {
        let net = MockNetwork::new();
        let first = started(&net, 1);
        first.register(&advert("alice")).await.unwrap();

        let second = started(&net, 2);
        let err = second.register(&advert("alice")).await.unwrap_err();
        assert!(matches!(err, DiscoveryError::HostTaken(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn browse_drops_instances_that_do_not_resolve() {
        let net = MockNetwork::new();
        three_peers(&net);
        let engine = started(&net, 1);

        let found = engine
            .browse_service_instances("_pagecache._tcp")
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].friendly_name, "one");
        assert_eq!(found[0].domain_name, "one.local");
        assert_eq!(found[0].ip_address, Ipv4Addr::new(10, 1, 0, 1));
        assert_eq!(found[0].port, 9001);
        assert_eq!(found[1].instance_name, "three._pagecache._tcp.local");
        assert_eq!(found[1].port, 9003);
        assert_eq!(found[1].service_type, "_pagecache._tcp");
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_reports_missing_srv() {
        let net = MockNetwork::new();
        three_peers(&net);
        let engine = started(&net, 1);

        let err = engine
            .resolve_service("two._pagecache._tcp.local")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "did not find SRV record for service: two._pagecache._tcp.local"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_reports_missing_a_with_the_srv() {
        let net = MockNetwork::new();
        net.set_script(|msg, _| {
            match msg.questions.first() {
                Some(q) if msg.is_query() && q.query_type == TYPE_SRV => {
                    vec![Message::response(vec![ResourceRecord::srv(
                        q.name.clone(),
                        0,
                        0,
                        9002,
                        "ghost.local",
                        120,
                    )])]
                }
                _ => Vec::new(),
            }
        });
        let engine = started(&net, 1);

        let err = engine
            .resolve_service("two._pagecache._tcp.local")
            .await
            .unwrap_err();
        let DiscoveryError::ARecordNotFound(json) = &err else {
            panic!("unexpected error: {err}");
        };
        let srv: ResourceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(
            srv.data,
            RecordData::Srv {
                priority: 0,
                weight: 0,
                port: 9002,
                target_domain: "ghost.local".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn two_engines_find_each_other() {
        let net = MockNetwork::new();
        let server = started(&net, 1);
        server.register(&advert("alice")).await.unwrap();

        let client = started(&net, 2);
        let found = client.resolve_service("alice._pagecache._tcp.local").await.unwrap();
        assert_eq!(found.ip_address, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(found.port, 8081);
        assert_eq!(found.domain_name, "laptop.local");

        let browsed = client
            .browse_service_instances("_pagecache._tcp")
            .await
            .unwrap();
        assert_eq!(browsed, vec![found]);
    }

    #[tokio::test(start_paused = true)]
    async fn responder_answers_qu_questions_directly() {
        let net = MockNetwork::new();
        let server = started(&net, 1);
        server.register(&advert("alice")).await.unwrap();
        let sent_before = net.sent_by(addr(1)).len();

        let asker = addr(9);
        let _socket = net.socket(asker);
        net.inject(
            addr(1),
            &Message::query(Question::new("laptop.local", TYPE_A, CLASS_IN).with_unicast_response()),
            asker,
        );
        tokio::time::sleep(Duration::from_millis(700)).await;

        let sent = net.sent_by(addr(1));
        let reply = sent[sent_before..]
            .iter()
            .find(|d| d.target == asker)
            .expect("unicast reply");
        let msg = reply.message.as_ref().unwrap();
        assert!(msg.questions.is_empty());
        assert_eq!(msg.answers, server.store().query("laptop.local", TYPE_A, CLASS_IN));
    }

    #[tokio::test(start_paused = true)]
    async fn enumeration_query_lists_service_types() {
        let net = MockNetwork::new();
        let server = started(&net, 1);
        server.register(&advert("alice")).await.unwrap();

        let client = started(&net, 2);
        let found = client
            .query_for_responses(
                peercache_protocol::DNSSD_ENUMERATION_NAME,
                TYPE_PTR,
                CLASS_IN,
                QueryOptions::single(client.config()),
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].answers[0].name, "_pagecache._tcp");
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_state_and_refuses_work() {
        let net = MockNetwork::new();
        let mut engine = started(&net, 1);
        engine.register(&advert("alice")).await.unwrap();
        assert!(engine.is_running());

        engine.stop();
        assert!(!engine.is_running());
        assert!(engine.store().lock().is_empty());
        assert_eq!(engine.listener_count(), 0);
        assert!(matches!(
            engine.browse_service_instances("_pagecache._tcp").await,
            Err(DiscoveryError::NotRunning)
        ));

        // the pending re-announcement finds the transport closed
        let before = net.responses().len();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(net.responses().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_datagrams_are_dropped_and_receiving_continues() {
        let net = MockNetwork::new();
        let server = started(&net, 1);
        server.register(&advert("alice")).await.unwrap();
        let mut seen = server.transport().unwrap().subscribe();
        let sent_before = net.sent_by(addr(1)).len();

        let asker = addr(9);
        let _socket = net.socket(asker);
        // too short for a header, then a header claiming a question that is not there
        net.inject_bytes(addr(1), vec![0xde, 0xad, 0xbe], asker);
        net.inject_bytes(addr(1), vec![0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0], asker);
        net.inject(
            addr(1),
            &Message::query(Question::new("laptop.local", TYPE_A, CLASS_IN).with_unicast_response()),
            asker,
        );
        tokio::time::sleep(Duration::from_millis(700)).await;

        let delivered = seen.drain();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].message.questions[0].name, "laptop.local");
        assert_eq!(delivered[0].source, asker);

        let replies: Vec<_> = net.sent_by(addr(1))[sent_before..]
            .iter()
            .filter(|d| d.target == asker)
            .cloned()
            .collect();
        assert_eq!(replies.len(), 1);
    }

    #[tokio::test]
    async fn failed_bind_names_the_step_and_leaves_the_engine_stopped() {
        let mut engine = Engine::new(DiscoveryConfig {
            // TEST-NET-3, never assigned to a local interface
            bind: Ipv4Addr::new(203, 0, 113, 7),
            ..DiscoveryConfig::default()
        });
        let err = engine.start().unwrap_err();
        assert!(
            matches!(err, DiscoveryError::Socket { step: SocketStep::Bind, .. }),
            "unexpected error: {err}"
        );
        assert!(!engine.is_running());
        assert_eq!(engine.listener_count(), 0);

        // a failed start does not block a later one
        let net = MockNetwork::new();
        engine.start_with_socket(net.socket(addr(1))).unwrap();
        assert!(engine.is_running());
    }

    #[tokio::test]
    async fn starting_twice_is_an_error() {
        let net = MockNetwork::new();
        let mut engine = started(&net, 1);
        assert!(matches!(
            engine.start_with_socket(net.socket(addr(3))),
            Err(DiscoveryError::AlreadyRunning)
        ));
    }
}
