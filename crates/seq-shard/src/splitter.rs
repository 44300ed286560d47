//! Shard assignment
//!
//! Sequences are stable-sorted by descending length and dealt round-robin to
//! nodes starting at node 0. Ties keep input order.

use crate::fasta::FastaRecord;
use fleet_core::{Error, NodeIndex, Result};
use serde::{Deserialize, Serialize};

/// One node's slice of the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Node the shard is assigned to
    pub node: NodeIndex,

    /// Sequences in assignment order
    pub records: Vec<FastaRecord>,
}

impl Shard {
    /// Number of sequences
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no sequence was assigned
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total residues across the shard
    pub fn residue_count(&self) -> usize {
        self.records.iter().map(|r| r.residues.len()).sum()
    }

    /// Headers in assignment order
    pub fn headers(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.header.as_str()).collect()
    }

    /// Render the shard as FASTA text
    pub fn to_fasta(&self) -> String {
        crate::fasta::write_fasta(&self.records)
    }
}

/// Shards for every node, indexed by node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    shards: Vec<Shard>,
}

impl ShardPlan {
    /// Shards in node order; always one per node, possibly empty
    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    /// Shard for a node
    pub fn shard(&self, node: NodeIndex) -> Option<&Shard> {
        self.shards.get(node)
    }

    /// Number of nodes covered
    pub fn node_count(&self) -> usize {
        self.shards.len()
    }

    /// Total sequences across all shards
    pub fn total_sequences(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }
}

/// Assign records to `nodes` shards, longest first, round-robin from node 0
pub fn split_round_robin(mut records: Vec<FastaRecord>, nodes: usize) -> Result<ShardPlan> {
    if nodes == 0 {
        return Err(Error::InvalidConfig {
            message: "cannot split across zero nodes".to_string(),
        });
    }

    // `sort_by` is stable, so equal lengths keep input order.
    records.sort_by(|a, b| b.residues.len().cmp(&a.residues.len()));

    let mut shards: Vec<Shard> = (0..nodes)
        .map(|node| Shard {
            node,
            records: Vec::new(),
        })
        .collect();

    for (position, record) in records.into_iter().enumerate() {
        shards[position % nodes].records.push(record);
    }

    tracing::info!(
        nodes = nodes,
        sequences = shards.iter().map(Shard::len).sum::<usize>(),
        "Assigned sequences to shards"
    );

    Ok(ShardPlan { shards })
}
