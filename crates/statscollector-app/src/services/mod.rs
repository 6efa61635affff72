//! Outbound side effects: metric publishing and archival.

pub mod archive;
pub mod drive;
pub mod pushgateway;
pub mod uploader;

pub use archive::{ArchiveError, ArchiveStore, FolderEntry, FsArchiveStore};
pub use drive::{DriveArchiveStore, DriveCredentials};
pub use pushgateway::{PublishError, PublishReport, PushGateway};
pub use uploader::{UploadReport, Uploader};
