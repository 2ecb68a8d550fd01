//! Backend drivers
//!
//! Each backend implements [`StorageDriver`] and presents the same node model over
//! its own storage API.

pub mod cloud;
pub mod contract;
pub mod handle;
pub mod local;

pub use cloud::CloudDriver;
pub use contract::{DriverKind, StorageDriver};
pub use handle::{DirectoryHandle, EntryKind, FsDirectory, HandleEntry, PermissionState};
pub use local::HandleDriver;
