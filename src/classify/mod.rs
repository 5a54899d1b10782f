pub mod merge;
pub mod shard;

pub use merge::{merge_tallies, MergeOptions, MergedProfile, ProfileMerger};
pub use shard::{classify_in_shards, ReadOutcome, ShardClassifier, ShardOptions};
