//! Partitioning pipeline: quality metrics, initial partitioning of the
//! coarsest level, the uncoarsening driver, and the top-level
//! multilevel partitioner.

pub mod initial;
pub mod metrics;
pub mod partitioner;
pub mod uncoarsen;

pub use initial::{BfsInitialPartitioner, InitialPartitioner};
pub use metrics::Metrics;
pub use partitioner::{partition, PartitionResult};
