//! The zone data source: the dispatcher's only external collaborator.
//!
//! Grounded on the shape of `ZoneStore` (an `Arc<RwLock<HashMap<..>>>` behind
//! a handful of lookup methods), trimmed to the four RRsets the NOTIFY
//! dispatcher actually needs. Answering authoritative queries, parsing zone
//! files, and zone transfer all live outside this trait by design.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::wire::{RRClass, RRType};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecondaryEndpoint {
    pub ip: String,
    pub port: u16,
}

impl SecondaryEndpoint {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: 53,
        }
    }

    pub fn with_port(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl std::fmt::Display for SecondaryEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ip.contains(':') {
            write!(f, "[{}]:{}", self.ip, self.port)
        } else {
            write!(f, "{}:{}", self.ip, self.port)
        }
    }
}

/// One RRset entry relevant to NOTIFY resolution. Only the record kinds the
/// resolver consumes are modeled; anything else a real zone carries is out
/// of scope for this data source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RData {
    Soa { mname: String },
    Ns { nsdname: String },
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
}

impl RData {
    fn rtype(&self) -> RRType {
        match self {
            RData::Soa { .. } => RRType::SOA,
            RData::Ns { .. } => RRType::NS,
            RData::A(_) => RRType::A,
            RData::Aaaa(_) => RRType::AAAA,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataSourceError {
    #[error("zone or owner name not found")]
    NotFound,
    #[error("data source I/O error: {0}")]
    Io(String),
}

/// Supplies SOA/NS/A/AAAA RRsets and statically configured secondaries for a
/// zone. The dispatcher's resolver (§4.2 of the notify dispatch design) is
/// the sole consumer.
#[async_trait]
pub trait ZoneDataSource: Send + Sync {
    /// Looks up the RRset of type `rtype` at `owner` within
    /// `zone_name`/`class`. `owner` is either the zone apex (for SOA/NS
    /// lookups) or an NS target name (for A/AAAA lookups). A and AAAA
    /// lookups at the same owner are independent calls, so a failure
    /// fetching one never suppresses a result already obtained for the
    /// other.
    async fn lookup(
        &self,
        zone_name: &str,
        class: RRClass,
        owner: &str,
        rtype: RRType,
    ) -> Result<Vec<RData>, DataSourceError>;

    /// Secondaries configured out-of-band for this zone (e.g. an
    /// `also-notify` style list), independent of NS discovery.
    fn configured_secondaries(&self, zone_name: &str, class: RRClass) -> Vec<SecondaryEndpoint>;
}

#[derive(Clone, Default)]
struct ZoneEntry {
    records: HashMap<String, Vec<RData>>,
    secondaries: Vec<SecondaryEndpoint>,
}

/// In-memory `ZoneDataSource`, populated at construction time. Used by the
/// binary for static configuration and by tests as a deterministic stand-in.
#[derive(Default)]
pub struct InMemoryZoneDataSource {
    zones: RwLock<HashMap<(String, RRClass), ZoneEntry>>,
}

impl InMemoryZoneDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(zone_name: &str, class: RRClass) -> (String, RRClass) {
        (zone_name.trim_end_matches('.').to_ascii_lowercase(), class)
    }

    /// Declares a zone with its apex SOA mname and NS set, so the resolver
    /// has something to find. No-op replace if the zone already exists.
    pub fn add_zone(&self, zone_name: &str, class: RRClass, soa_mname: &str, ns_names: &[&str]) {
        let mut zones = self.zones.write();
        let entry = zones.entry(Self::key(zone_name, class)).or_default();
        let apex = zone_name.trim_end_matches('.').to_ascii_lowercase();
        let mut records = vec![RData::Soa {
            mname: soa_mname.to_string(),
        }];
        records.extend(ns_names.iter().map(|n| RData::Ns {
            nsdname: n.to_string(),
        }));
        entry.records.insert(apex, records);
    }

    /// Adds an A/AAAA address for an owner name (typically an NS target).
    pub fn add_address(&self, zone_name: &str, class: RRClass, owner: &str, rdata: RData) {
        let mut zones = self.zones.write();
        let entry = zones.entry(Self::key(zone_name, class)).or_default();
        entry
            .records
            .entry(owner.trim_end_matches('.').to_ascii_lowercase())
            .or_default()
            .push(rdata);
    }

    pub fn add_configured_secondary(
        &self,
        zone_name: &str,
        class: RRClass,
        secondary: SecondaryEndpoint,
    ) {
        let mut zones = self.zones.write();
        let entry = zones.entry(Self::key(zone_name, class)).or_default();
        entry.secondaries.push(secondary);
    }

    pub fn has_zone(&self, zone_name: &str, class: RRClass) -> bool {
        self.zones.read().contains_key(&Self::key(zone_name, class))
    }
}

#[async_trait]
impl ZoneDataSource for InMemoryZoneDataSource {
    async fn lookup(
        &self,
        zone_name: &str,
        class: RRClass,
        owner: &str,
        rtype: RRType,
    ) -> Result<Vec<RData>, DataSourceError> {
        let zones = self.zones.read();
        let entry = zones
            .get(&Self::key(zone_name, class))
            .ok_or(DataSourceError::NotFound)?;

        let owner_key = owner.trim_end_matches('.').to_ascii_lowercase();
        let matches: Vec<RData> = entry
            .records
            .get(&owner_key)
            .into_iter()
            .flatten()
            .filter(|r| r.rtype() == rtype)
            .cloned()
            .collect();

        if matches.is_empty() {
            Err(DataSourceError::NotFound)
        } else {
            Ok(matches)
        }
    }

    fn configured_secondaries(&self, zone_name: &str, class: RRClass) -> Vec<SecondaryEndpoint> {
        self.zones
            .read()
            .get(&Self::key(zone_name, class))
            .map(|entry| entry.secondaries.clone())
            .unwrap_or_default()
    }
}

pub type SharedZoneDataSource = Arc<dyn ZoneDataSource>;
