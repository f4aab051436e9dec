//! Zone data source: the dispatcher's sole external collaborator for
//! SOA/NS/A/AAAA lookups and statically configured secondaries.

mod source;

pub use source::{
    DataSourceError, InMemoryZoneDataSource, RData, SecondaryEndpoint, SharedZoneDataSource,
    ZoneDataSource,
};
