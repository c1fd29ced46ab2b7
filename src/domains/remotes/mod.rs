pub mod registry;
pub mod transport;

pub use registry::{RemoteInfo, RemoteRegistry, SharedRemote};
