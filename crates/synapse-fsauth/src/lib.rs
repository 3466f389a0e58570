//! Filesystem authority: an HTTP tool server enforcing a path allow-list.
//!
//! Exposes `save_file` and `validate_path` over HTTP. A candidate path is
//! allowed iff, once symlinks and `..` segments are resolved, it falls
//! inside one of the configured allow-list roots.

pub mod error;
pub mod path;
pub mod server;
pub mod state;

pub use error::{FsAuthError, FsAuthResult};
pub use state::AppState;
