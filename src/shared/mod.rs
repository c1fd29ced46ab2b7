pub mod blocking;
pub mod remote_name;
pub mod vpath;
