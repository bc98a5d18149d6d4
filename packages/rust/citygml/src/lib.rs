//! Streaming CityGML transforms for cityprep.
//!
//! All operations rewrite a document as a single pass over `quick-xml`
//! events (attribute insertion runs a scan pass first), so everything not
//! touched by a transform round-trips byte-for-byte.

pub mod insert;
pub mod merge;
pub mod namespaces;
pub mod scan;
pub mod usetype;

pub use insert::{InsertOptions, insert_attributes};
pub use merge::merge_documents;
pub use namespaces::NamespaceContext;
pub use scan::{BuildingIndex, scan_document};
pub use usetype::{UsetypeOptions, remap_usetypes};
