pub mod loader;
pub mod types;

pub use loader::{BIND_ENV, DATA_ROOT_ENV, SettingsLoader};
pub use types::*;
