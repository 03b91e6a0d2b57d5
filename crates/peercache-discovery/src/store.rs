//! Authoritative record store and the query-matching predicate.
//!
//! The store only ever holds records this node registered itself; nothing
//! learned from the network is cached here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use peercache_protocol::{
    ResourceRecord, CACHE_FLUSH_BIT, CLASS_ANY, DNSSD_ENUMERATION_NAME, TYPE_ANY, TYPE_PTR,
};

/// Does `record` answer a question for `(name, rtype, class)`?
///
/// Names compare case-insensitively. The DNS-SD enumeration name matches
/// every PTR record regardless of its owner name (RFC 6763 §9). The
/// cache-flush bit on the record's class is ignored.
pub fn record_matches(record: &ResourceRecord, name: &str, rtype: u16, class: u16) -> bool {
    let name_ok = if is_enumeration_name(name) {
        record.record_type() == TYPE_PTR
    } else {
        names_equal(&record.name, name)
    };
    name_ok
        && (rtype == TYPE_ANY || rtype == record.record_type())
        && (class == CLASS_ANY || class == record.record_class() & !CACHE_FLUSH_BIT)
}

/// Filter `records` down to the ones matching `(name, rtype, class)`.
pub fn matching<'a>(
    records: impl IntoIterator<Item = &'a ResourceRecord>,
    name: &str,
    rtype: u16,
    class: u16,
) -> Vec<ResourceRecord> {
    records
        .into_iter()
        .filter(|r| record_matches(r, name, rtype, class))
        .cloned()
        .collect()
}

fn is_enumeration_name(name: &str) -> bool {
    names_equal(name, DNSSD_ENUMERATION_NAME)
}

fn names_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

fn bucket_key(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Records keyed by owner name, insertion order kept within each name.
#[derive(Debug, Default)]
pub struct RecordStore {
    buckets: HashMap<String, Vec<ResourceRecord>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&mut self, record: ResourceRecord) {
        self.buckets
            .entry(bucket_key(&record.name))
            .or_default()
            .push(record);
    }

    /// Records answering `(name, rtype, class)`.
    pub fn query(&self, name: &str, rtype: u16, class: u16) -> Vec<ResourceRecord> {
        if is_enumeration_name(name) {
            return matching(self.buckets.values().flatten(), name, rtype, class);
        }
        match self.buckets.get(&bucket_key(name)) {
            Some(bucket) => matching(bucket, name, rtype, class),
            None => Vec::new(),
        }
    }

    pub fn clear_all(&mut self) {
        self.buckets.clear();
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }
}

/// Store shared between the responder and the engine.
#[derive(Debug, Clone, Default)]
pub struct SharedRecordStore {
    inner: Arc<Mutex<RecordStore>>,
}

impl SharedRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RecordStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_record(&self, record: ResourceRecord) {
        self.lock().add_record(record);
    }

    pub fn query(&self, name: &str, rtype: u16, class: u16) -> Vec<ResourceRecord> {
        self.lock().query(name, rtype, class)
    }

    pub fn clear_all(&self) {
        self.lock().clear_all();
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use peercache_protocol::{CLASS_IN, TYPE_A, TYPE_SRV};

    use super::*;

    fn populated() -> RecordStore {
        let mut store = RecordStore::new();
        store.add_record(ResourceRecord::a("laptop.local", Ipv4Addr::new(10, 0, 0, 1), 120));
        store.add_record(ResourceRecord::a("laptop.local", Ipv4Addr::new(10, 0, 0, 2), 120));
        store.add_record(ResourceRecord::srv(
            "alice._pagecache._tcp.local",
            0,
            0,
            8081,
            "laptop.local",
            120,
        ));
        store.add_record(ResourceRecord::ptr(
            "_pagecache._tcp",
            "alice._pagecache._tcp.local",
            120,
        ));
        store.add_record(ResourceRecord::ptr(
            "_other._udp",
            "bob._other._udp.local",
            120,
        ));
        store
    }

    #[test]
    fn any_type_returns_every_type_under_a_name() {
        let mut store = populated();
        store.add_record(ResourceRecord::ptr("laptop.local", "weird.local", 120));
        let found = store.query("laptop.local", TYPE_ANY, CLASS_IN);
        let types: Vec<u16> = found.iter().map(ResourceRecord::record_type).collect();
        assert_eq!(types, [TYPE_A, TYPE_A, TYPE_PTR]);
    }

    #[test]
    fn type_filter_applies() {
        let store = populated();
        assert_eq!(store.query("laptop.local", TYPE_A, CLASS_IN).len(), 2);
        assert!(store.query("laptop.local", TYPE_SRV, CLASS_IN).is_empty());
        assert_eq!(
            store
                .query("alice._pagecache._tcp.local", TYPE_SRV, CLASS_ANY)
                .len(),
            1
        );
    }

    #[test]
    fn insertion_order_kept_within_a_name() {
        let store = populated();
        let found = store.query("laptop.local", TYPE_A, CLASS_IN);
        assert_eq!(
            found[0].data,
            peercache_protocol::RecordData::A {
                ip_address: Ipv4Addr::new(10, 0, 0, 1)
            }
        );
    }

    #[test]
    fn enumeration_name_returns_every_ptr() {
        let store = populated();
        let found = store.query(DNSSD_ENUMERATION_NAME, TYPE_ANY, CLASS_ANY);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|r| r.record_type() == TYPE_PTR));
        let mut owners: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        owners.sort_unstable();
        assert_eq!(owners, ["_other._udp", "_pagecache._tcp"]);

        assert!(store
            .query(DNSSD_ENUMERATION_NAME, TYPE_A, CLASS_ANY)
            .is_empty());
    }

    #[test]
    fn class_filter_applies() {
        let mut store = RecordStore::new();
        store.add_record(ResourceRecord::a("h.local", Ipv4Addr::LOCALHOST, 1).with_class(3));
        assert!(store.query("h.local", TYPE_A, CLASS_IN).is_empty());
        assert_eq!(store.query("h.local", TYPE_A, 3).len(), 1);
        assert_eq!(store.query("h.local", TYPE_A, CLASS_ANY).len(), 1);
    }

    #[test]
    fn cache_flush_bit_does_not_hide_an_answer() {
        let answers = vec![
            ResourceRecord::a("printer.local", Ipv4Addr::new(10, 0, 0, 5), 120)
                .with_class(CACHE_FLUSH_BIT | CLASS_IN),
        ];
        assert_eq!(matching(&answers, "printer.local", TYPE_A, CLASS_IN).len(), 1);
        assert_eq!(matching(&answers, "printer.local", TYPE_A, CLASS_ANY).len(), 1);
        assert!(matching(&answers, "printer.local", TYPE_A, 3).is_empty());
    }

    #[test]
    fn names_are_case_insensitive() {
        let store = populated();
        assert_eq!(store.query("LAPTOP.Local.", TYPE_A, CLASS_IN).len(), 2);
    }

    #[test]
    fn unknown_name_is_empty() {
        assert!(populated().query("nobody.local", TYPE_ANY, CLASS_ANY).is_empty());
    }

    #[test]
    fn clear_all_empties_store() {
        let shared = SharedRecordStore::new();
        shared.add_record(ResourceRecord::a("h.local", Ipv4Addr::LOCALHOST, 1));
        assert_eq!(shared.lock().len(), 1);
        shared.clear_all();
        assert!(shared.lock().is_empty());
        assert!(shared.query("h.local", TYPE_ANY, CLASS_ANY).is_empty());
    }

    #[test]
    fn predicate_over_answer_lists() {
        let answers = vec![
            ResourceRecord::a("h.local", Ipv4Addr::LOCALHOST, 1),
            ResourceRecord::ptr("_x._tcp", "a._x._tcp.local", 1),
        ];
        assert_eq!(matching(&answers, "h.local", TYPE_ANY, CLASS_IN).len(), 1);
        assert_eq!(
            matching(&answers, DNSSD_ENUMERATION_NAME, TYPE_ANY, CLASS_IN).len(),
            1
        );
        assert!(matching(&answers, "a._x._tcp.local", TYPE_ANY, CLASS_IN).is_empty());
    }
}
