pub mod branches;
pub mod commits;
pub mod diff;
pub mod history;
pub mod refs;
pub mod repository;
pub mod snapshot;
pub mod staging;

pub use diff::{DiffReport, FileDelta, FileStatus};
pub use repository::RepoHandle;
pub use snapshot::{TreeSnapshotter, WorktreeScope};
