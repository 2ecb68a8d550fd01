//! Notestore: Markdown note storage over interchangeable backends
//!
//! Notes live in a folder tree addressed by slash-joined path ids. The same node
//! model is served by three drivers (an app-private sandbox directory, a
//! user-picked local folder, and a cloud object store), with a router holding
//! the single active session and a tree builder re-deriving the hierarchy.

pub mod backup;
pub mod concurrency;
pub mod config;
pub mod debounce;
pub mod driver;
pub mod error;
pub mod logging;
pub mod migration;
pub mod node;
pub mod router;
pub mod session;
pub mod tooling;
pub mod tree;
pub mod types;

pub use driver::{DriverKind, StorageDriver};
pub use error::StorageError;
pub use node::{Node, NodeKind};
pub use router::{SelectOptions, StorageRouter};
pub use session::SessionState;
