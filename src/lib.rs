//! Multi-tenant git sandbox: isolated per-session filesystems and
//! repositories driven by shell-style command lines, shared bare remotes
//! and a pull request workflow on top of them.

pub mod api;
pub mod commands;
pub mod domains;
pub mod errors;
pub mod shared;
pub mod utils;

pub use domains::sessions::SessionManager;
pub use errors::{ErrorKind, SandboxError};
