//! Sequence sharding for the search fleet
//!
//! This crate provides:
//! - **FASTA parsing** into ordered records
//! - **Shard assignment**: longest sequences first, dealt round-robin across
//!   nodes starting at node 0, so every node gets a similar share of the work
//!
//! Assignment is a pure function of the input records and the node count:
//! identical inputs always produce byte-identical shards.
//!
//! # Example
//!
//! ```rust
//! use seq_shard::{parse_fasta, split_round_robin};
//!
//! let records = parse_fasta(">a\nACGTACGT\n>b\nAC\n>c\nACGTA\n").unwrap();
//! let plan = split_round_robin(records, 2).unwrap();
//!
//! assert_eq!(plan.shards()[0].headers(), vec!["a", "b"]);
//! assert_eq!(plan.shards()[1].headers(), vec!["c"]);
//! ```

mod fasta;
mod splitter;

pub use fasta::{parse_fasta, write_fasta, FastaRecord};
pub use splitter::{split_round_robin, Shard, ShardPlan};

// Re-export types from fleet-core for convenience
pub use fleet_core::NodeIndex;

#[cfg(test)]
mod tests {
    use super::*;

    fn fasta_with_lengths(lengths: &[usize]) -> String {
        lengths
            .iter()
            .enumerate()
            .map(|(i, len)| format!(">seq{} len={}\n{}\n", i, len, "A".repeat(*len)))
            .collect()
    }

    /// Parse, split and render a whole input the way a node does
    #[test]
    fn test_full_workflow() {
        let input = fasta_with_lengths(&[500, 10, 10, 10, 300, 10, 10]);
        let records = parse_fasta(&input).unwrap();
        assert_eq!(records.len(), 7);

        let plan = split_round_robin(records, 3).unwrap();
        let lengths: Vec<Vec<usize>> = plan
            .shards()
            .iter()
            .map(|s| s.records.iter().map(|r| r.residues.len()).collect())
            .collect();

        assert_eq!(lengths[0], vec![500, 10, 10]);
        assert_eq!(lengths[1], vec![300, 10]);
        assert_eq!(lengths[2], vec![10, 10]);
        assert_eq!(plan.total_sequences(), 7);
    }

    /// Same input, same node count: byte-identical shards
    #[test]
    fn test_deterministic_rendering() {
        let input = fasta_with_lengths(&[40, 40, 12, 90, 12, 5, 40, 90]);

        let first: Vec<String> = split_round_robin(parse_fasta(&input).unwrap(), 3)
            .unwrap()
            .shards()
            .iter()
            .map(Shard::to_fasta)
            .collect();
        let second: Vec<String> = split_round_robin(parse_fasta(&input).unwrap(), 3)
            .unwrap()
            .shards()
            .iter()
            .map(Shard::to_fasta)
            .collect();

        assert_eq!(first, second);
    }

    /// Every sequence lands in exactly one shard
    #[test]
    fn test_counts_sum_to_input() {
        let input = fasta_with_lengths(&[3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5]);
        for nodes in 1..=13 {
            let plan = split_round_robin(parse_fasta(&input).unwrap(), nodes).unwrap();
            assert_eq!(plan.shards().len(), nodes);
            let total: usize = plan.shards().iter().map(Shard::len).sum();
            assert_eq!(total, 11);
        }
    }
}
