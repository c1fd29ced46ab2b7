pub mod entity;
pub mod filesystem;
pub mod service;
pub mod workspace;

pub use entity::{Session, SessionState, SessionSummary};
pub use service::SessionManager;
