//! File-boundary I/O: the hMetis hypergraph format and partition files.

pub mod hmetis;

pub use hmetis::{read_hypergraph_file, write_partition_file};
