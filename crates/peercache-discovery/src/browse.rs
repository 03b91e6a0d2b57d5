//! Browsing a service type and resolving instances to an address and port.

use std::net::Ipv4Addr;

use peercache_protocol::{Message, RecordData, ResourceRecord, CLASS_IN, TYPE_A, TYPE_PTR, TYPE_SRV};
use serde::Serialize;
use tracing::debug;

use crate::error::DiscoveryError;
use crate::query::{query_for_instance_info, query_for_ip_address, query_for_service_instances, QueryOptions};
use crate::register::LOCAL_DOMAIN;
use crate::store::record_matches;
use crate::transport::MdnsTransport;

/// A peer ready to be connected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedService {
    pub service_type: String,
    /// Full instance name, e.g. `alice._pagecache._tcp.local`.
    pub instance_name: String,
    /// Instance label with escapes removed, e.g. `alice`.
    pub friendly_name: String,
    /// Host the SRV record points at.
    pub domain_name: String,
    pub ip_address: Ipv4Addr,
    pub port: u16,
}

/// Options for the two stages of a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowseOptions {
    /// PTR stage.
    pub instances: QueryOptions,
    /// SRV and A stages.
    pub lookup: QueryOptions,
}

/// `alice\.home._pagecache._tcp.local` -> `alice.home`
pub fn friendly_name(instance_name: &str, service_type: &str) -> String {
    let suffix = format!(".{service_type}.{LOCAL_DOMAIN}");
    let trimmed = instance_name.trim_end_matches('.');
    let label = trimmed.strip_suffix(suffix.as_str()).unwrap_or(trimmed);
    label.replace("\\.", ".")
}

/// Split a full instance name into its label and service type.
///
/// The label ends at the first dot that is not escaped.
pub fn split_instance_name(instance_name: &str) -> Option<(&str, &str)> {
    let trimmed = instance_name.trim_end_matches('.');
    let without_domain = trimmed.strip_suffix(&format!(".{LOCAL_DOMAIN}")[..])?;

    let bytes = without_domain.as_bytes();
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'\\' if !escaped => escaped = true,
            b'.' if !escaped => {
                let (label, rest) = (&without_domain[..i], &without_domain[i + 1..]);
                return (!label.is_empty() && !rest.is_empty()).then_some((label, rest));
            }
            _ => escaped = false,
        }
    }
    None
}

fn answers<'a>(
    responses: &'a [Message],
    name: &'a str,
    rtype: u16,
) -> impl Iterator<Item = &'a ResourceRecord> + 'a {
    responses
        .iter()
        .flat_map(|m| &m.answers)
        .filter(move |r| record_matches(r, name, rtype, CLASS_IN))
}

/// Distinct instance names from PTR responses, first seen first.
pub fn instance_names(responses: &[Message], service_type: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in answers(responses, service_type, TYPE_PTR) {
        if let RecordData::Ptr { instance_name } = &record.data {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(instance_name)) {
                names.push(instance_name.clone());
            }
        }
    }
    names
}

fn first_srv<'a>(responses: &'a [Message], instance_name: &'a str) -> Option<&'a ResourceRecord> {
    answers(responses, instance_name, TYPE_SRV).next()
}

fn first_address(responses: &[Message], domain_name: &str) -> Option<Ipv4Addr> {
    answers(responses, domain_name, TYPE_A).find_map(|r| match r.data {
        RecordData::A { ip_address } => Some(ip_address),
        _ => None,
    })
}

/// Resolve one instance of a known service type.
pub async fn resolve_instance(
    transport: &MdnsTransport,
    service_type: &str,
    instance_name: &str,
    options: QueryOptions,
) -> Result<ResolvedService, DiscoveryError> {
    let srv_responses = query_for_instance_info(transport, instance_name, options).await?;
    let Some(srv) = first_srv(&srv_responses, instance_name) else {
        return Err(DiscoveryError::SrvNotFound(instance_name.to_string()));
    };
    let RecordData::Srv {
        port,
        target_domain,
        ..
    } = &srv.data
    else {
        return Err(DiscoveryError::SrvNotFound(instance_name.to_string()));
    };

    let a_responses = query_for_ip_address(transport, target_domain, options).await?;
    let Some(ip_address) = first_address(&a_responses, target_domain) else {
        return Err(DiscoveryError::ARecordNotFound(srv.to_json()?));
    };

    Ok(ResolvedService {
        service_type: service_type.to_string(),
        instance_name: instance_name.to_string(),
        friendly_name: friendly_name(instance_name, service_type),
        domain_name: target_domain.clone(),
        ip_address,
        port: *port,
    })
}

/// Resolve a full instance name such as `alice._pagecache._tcp.local`.
pub async fn resolve_service(
    transport: &MdnsTransport,
    instance_name: &str,
    options: QueryOptions,
) -> Result<ResolvedService, DiscoveryError> {
    let Some((_, service_type)) = split_instance_name(instance_name) else {
        return Err(DiscoveryError::SrvNotFound(instance_name.to_string()));
    };
    resolve_instance(transport, service_type, instance_name, options).await
}

/// Every instance of `service_type` that fully resolves.
///
/// An instance whose SRV or A lookup comes back empty is left out; it never
/// fails the browse.
pub async fn browse_service_instances(
    transport: &MdnsTransport,
    service_type: &str,
    options: BrowseOptions,
) -> Result<Vec<ResolvedService>, DiscoveryError> {
    let responses = query_for_service_instances(transport, service_type, options.instances).await?;
    let names = instance_names(&responses, service_type);
    debug!(service_type, instances = names.len(), "browse found instances");

    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        match resolve_instance(transport, service_type, &name, options.lookup).await {
            Ok(service) => resolved.push(service),
            Err(e @ (DiscoveryError::SrvNotFound(_) | DiscoveryError::ARecordNotFound(_))) => {
                debug!(instance = %name, error = %e, "dropping unresolvable instance");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(resolved)
}
