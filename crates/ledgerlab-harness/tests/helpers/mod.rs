pub mod cluster;

pub use cluster::{ClusterOutcome, TestCluster, BLOCK_TIME};
