pub mod errors;
pub mod record;
pub mod soa;
#[allow(clippy::module_inception)]
pub mod zone;

pub use errors::{Result, ZoneError};
pub use record::{Record, RecordType};
pub use soa::SoaRecord;
pub use zone::{Zone, validate_domain, zone_file_path};
