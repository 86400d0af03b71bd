//! hMetis-format hypergraph files and partition output.
//!
//! Header line `m n [fmt]`, where `fmt` is a two-digit flag: the tens
//! digit enables per-edge weights (leading each edge line), the ones
//! digit enables per-vertex weights (`n` trailing integer lines). Pins
//! are 1-indexed in the file and shifted to 0-indexed IDs on read.
//! Comment lines start with `%`.

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::datastructures::{
    EdgeWeight, HypergraphFactory, HypernodeId, NodeWeight, PartitionId, StaticHypergraph,
};
use crate::error::PartitionError;

fn invalid(msg: impl Into<String>) -> PartitionError {
    PartitionError::InvalidInput(msg.into())
}

/// Read a hypergraph in hMetis format.
pub fn read_hypergraph_file(
    path: impl AsRef<Path>,
    stable_construction: bool,
) -> Result<StaticHypergraph, PartitionError> {
    let file = fs::File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines().filter(|line| match line {
        Ok(l) => {
            let t = l.trim();
            !t.is_empty() && !t.starts_with('%')
        }
        Err(_) => true,
    });

    let header = lines
        .next()
        .ok_or_else(|| invalid("empty hypergraph file"))??;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(invalid(format!("malformed header line: '{header}'")));
    }
    let num_edges: usize = fields[0]
        .parse()
        .map_err(|_| invalid(format!("bad edge count '{}'", fields[0])))?;
    let num_nodes: u32 = fields[1]
        .parse()
        .map_err(|_| invalid(format!("bad node count '{}'", fields[1])))?;
    let fmt: u32 = match fields.get(2) {
        Some(f) => f
            .parse()
            .map_err(|_| invalid(format!("bad fmt flag '{f}'")))?,
        None => 0,
    };
    let has_edge_weights = fmt / 10 % 10 == 1;
    let has_node_weights = fmt % 10 == 1;

    let mut edge_vector: Vec<Vec<HypernodeId>> = Vec::with_capacity(num_edges);
    let mut edge_weights: Vec<EdgeWeight> = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        let line = lines
            .next()
            .ok_or_else(|| invalid("fewer edge lines than the header promises"))??;
        let mut values = line.split_whitespace().map(|t| {
            t.parse::<i64>()
                .map_err(|_| invalid(format!("non-integer token '{t}'")))
        });
        let weight = if has_edge_weights {
            values
                .next()
                .ok_or_else(|| invalid("edge line missing its weight"))??
        } else {
            1
        };
        if weight <= 0 {
            return Err(invalid(format!("non-positive edge weight {weight}")));
        }
        let mut pins = Vec::new();
        for value in values {
            let pin = value?;
            if pin < 1 || pin > num_nodes as i64 {
                return Err(invalid(format!(
                    "pin {pin} out of range 1..={num_nodes}"
                )));
            }
            pins.push((pin - 1) as HypernodeId);
        }
        if pins.is_empty() {
            return Err(invalid("edge line without pins"));
        }
        edge_vector.push(pins);
        edge_weights.push(weight);
    }

    let node_weights: Option<Vec<NodeWeight>> = if has_node_weights {
        let mut weights = Vec::with_capacity(num_nodes as usize);
        for _ in 0..num_nodes {
            let line = lines
                .next()
                .ok_or_else(|| invalid("fewer vertex weight lines than the header promises"))??;
            let w: i64 = line
                .trim()
                .parse()
                .map_err(|_| invalid(format!("bad vertex weight '{}'", line.trim())))?;
            if w <= 0 {
                return Err(invalid(format!("non-positive vertex weight {w}")));
            }
            weights.push(w);
        }
        Some(weights)
    } else {
        None
    };

    HypergraphFactory::from_edge_list(
        num_nodes,
        &edge_vector,
        if has_edge_weights { Some(&edge_weights) } else { None },
        node_weights.as_deref(),
        stable_construction,
    )
}

/// Write the partition file: one 0-indexed block per line, in vertex
/// order. Written to a temporary sibling and renamed, so a failed run
/// never leaves partial output behind.
pub fn write_partition_file(
    path: impl AsRef<Path>,
    parts: &[PartitionId],
) -> Result<(), PartitionError> {
    let path = path.as_ref();
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        let mut buffer = String::with_capacity(parts.len() * 2);
        for &p in parts {
            buffer.push_str(&p.to_string());
            buffer.push('\n');
        }
        file.write_all(buffer.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
