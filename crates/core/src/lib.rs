//! s3archive-core: change detection engine for object-storage mirrors
//!
//! Maps local paths to remote keys, computes S3-compatible entity tags and
//! classifies local files against a snapshot of the remote objects.

pub mod config;
pub mod detect;
pub mod etag;
pub mod index;
pub mod mapping;
pub mod scan;
pub mod signature;

pub use config::{ArchiveConfig, MappingConfig};
pub use detect::{ChangeDetector, ChangeReason, ChangeVerdict, Comparison, Detection, FileChange};
pub use etag::{DEFAULT_PART_SIZE, EntityTag, EtagHasher};
pub use index::{RemoteIndex, RemoteObjectRecord};
pub use mapping::PathMapper;
pub use scan::Scanner;
pub use signature::LocalSignature;
