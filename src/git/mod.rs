//! Local three-way merge probing
//!
//! The prober drives a narrow [`MergeEngine`] capability trait instead of
//! shelling out to git; the production engine is backed by libgit2.

pub mod operations;
pub mod prober;

pub use operations::{Git2MergeEngine, MergeEngine, MergeOutcome, UnmergedPath};
pub use prober::{LocalMergeProber, MergeProbe, ProbeOutcome, ProbeRequest, RepositoryRef};
