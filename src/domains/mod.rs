pub mod git;
pub mod merge;
pub mod remotes;
pub mod sessions;
pub mod settings;
