//! SessionPath Geolocation
//!
//! IP to `{country, province, city}` resolution:
//! - `GeoLookup` trait, the seam for any read-only dataset
//! - `GeoTable`, an IPv4 range table loaded from a JSON lines snapshot
//! - `GeoEnricher`, the per-event contract that never fails a record

pub mod enricher;
pub mod error;
pub mod table;

pub use enricher::{GeoEnricher, GeoLookup, LookupOutcome};
pub use error::{GeoError, GeoResult};
pub use table::{GeoRange, GeoTable};
