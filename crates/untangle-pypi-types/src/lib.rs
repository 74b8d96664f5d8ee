pub use lenient_requirement::{LenientRequirement, LenientVersionSpecifiers};
pub use metadata::{Metadata, MetadataError};
pub use simple_json::{File, Hashes, SimpleJson, Yanked};

mod lenient_requirement;
mod metadata;
mod simple_json;
