//! Secondary resolver (§4.2): turns a zone into an ordered list of
//! secondaries to notify, never failing the caller — any trouble along the
//! way degrades to an empty discovered list and a log line.

use tracing::warn;

use crate::wire::{RRClass, RRType};
use crate::zone::{RData, SecondaryEndpoint, ZoneDataSource};

pub async fn resolve_secondaries(
    data_source: &dyn ZoneDataSource,
    zone_name: &str,
    class: RRClass,
) -> Vec<SecondaryEndpoint> {
    let static_secondaries = data_source.configured_secondaries(zone_name, class);
    let discovered = discover_via_ns(data_source, zone_name, class).await;

    let mut result = static_secondaries;
    result.extend(discovered);
    result
}

async fn discover_via_ns(
    data_source: &dyn ZoneDataSource,
    zone_name: &str,
    class: RRClass,
) -> Vec<SecondaryEndpoint> {
    let soa = match data_source.lookup(zone_name, class, zone_name, RRType::SOA).await {
        Ok(rrs) if rrs.len() == 1 => rrs,
        Ok(rrs) => {
            warn!(zone = zone_name, count = rrs.len(), "SOA multiplicity is not 1, skipping NS discovery");
            return Vec::new();
        }
        Err(err) => {
            warn!(zone = zone_name, %err, "SOA lookup failed, skipping NS discovery");
            return Vec::new();
        }
    };

    let mname = match &soa[0] {
        RData::Soa { mname } => mname.clone(),
        _ => return Vec::new(),
    };
    let mname_key = mname.trim_end_matches('.').to_ascii_lowercase();

    let ns_records = match data_source.lookup(zone_name, class, zone_name, RRType::NS).await {
        Ok(rrs) => rrs,
        Err(err) => {
            warn!(zone = zone_name, %err, "NS lookup failed, skipping NS discovery");
            return Vec::new();
        }
    };

    let mut result = Vec::new();
    for rr in ns_records {
        let RData::Ns { nsdname } = rr else { continue };
        if nsdname.trim_end_matches('.').to_ascii_lowercase() == mname_key {
            continue;
        }

        match data_source.lookup(zone_name, class, &nsdname, RRType::A).await {
            Ok(addrs) => result.extend(addrs.into_iter().filter_map(to_secondary)),
            Err(err) => {
                warn!(zone = zone_name, ns = %nsdname, %err, "A lookup failed for NS target");
            }
        }

        match data_source.lookup(zone_name, class, &nsdname, RRType::AAAA).await {
            Ok(addrs) => result.extend(addrs.into_iter().filter_map(to_secondary)),
            Err(err) => {
                warn!(zone = zone_name, ns = %nsdname, %err, "AAAA lookup failed for NS target");
            }
        }
    }

    result
}

fn to_secondary(rdata: RData) -> Option<SecondaryEndpoint> {
    match rdata {
        RData::A(addr) => Some(SecondaryEndpoint::new(addr.to_string())),
        RData::Aaaa(addr) => Some(SecondaryEndpoint::new(addr.to_string())),
        _ => None,
    }
}
