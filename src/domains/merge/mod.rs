pub mod local;
pub mod service;
pub mod strategy;
pub mod types;

pub use local::{LocalMergeOutcome, merge_into_head};
pub use service::PullRequestEngine;
pub use strategy::{MergePlan, plan_merge};
pub use types::{NewPullRequest, PrMergeMode, PrMergeOutcome, PrState, PullRequest};
