//! Token range splitting into parallel work units

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::token::{TokenRange, RING_SPAN};

/// One range of the cluster topology and the replicas that own it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    #[serde(flatten)]
    pub range: TokenRange,
    pub endpoints: Vec<String>,
}

impl RingEntry {
    pub fn new(range: TokenRange, endpoints: Vec<String>) -> Self {
        Self { range, endpoints }
    }
}

/// A unit of parallel work covering one token range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Position in the job's partition list, used to identify failures
    pub index: usize,
    pub range: TokenRange,
    /// Replica hosts in topology order
    pub replicas: IndexSet<String>,
}

/// Splits a ring topology into roughly `target` balanced partitions
#[derive(Debug, Clone, Copy)]
pub struct TokenRangeSplitter {
    target: usize,
}

impl TokenRangeSplitter {
    pub fn new(target: usize) -> Self {
        Self { target }
    }

    /// Largest span a partition may keep without being bisected
    pub fn max_span(&self) -> u128 {
        RING_SPAN / self.target.max(1) as u128
    }

    /// Compute partitions that tile the topology's coverage in ring order
    ///
    /// Every range wider than `RING_SPAN / target` is halved until it fits;
    /// children inherit the parent's replicas.
    pub fn split(&self, topology: &[RingEntry]) -> Result<Vec<Partition>> {
        if self.target == 0 {
            return Err(Error::Configuration(
                "split target must be positive".into(),
            ));
        }
        if topology.is_empty() {
            return Err(Error::Configuration("cluster topology is empty".into()));
        }

        let mut entries: Vec<&RingEntry> = topology.iter().collect();
        entries.sort_by_key(|e| e.range.start);
        check_tiling(&entries)?;

        let max_span = self.max_span();
        let mut ranges = Vec::new();
        let mut partitions = Vec::new();
        for entry in entries {
            ranges.clear();
            bisect_into(entry.range, max_span, &mut ranges);
            let replicas: IndexSet<String> = entry.endpoints.iter().cloned().collect();
            for range in ranges.drain(..) {
                partitions.push(Partition {
                    index: partitions.len(),
                    range,
                    replicas: replicas.clone(),
                });
            }
        }

        debug!(
            input_ranges = topology.len(),
            partitions = partitions.len(),
            target = self.target,
            "split token ring"
        );
        Ok(partitions)
    }
}

fn bisect_into(range: TokenRange, max_span: u128, out: &mut Vec<TokenRange>) {
    if range.span() > max_span {
        if let Some((left, right)) = range.bisect() {
            bisect_into(left, max_span, out);
            bisect_into(right, max_span, out);
            return;
        }
    }
    out.push(range);
}

/// Ranges sorted by start must chain end-to-start and cover the ring once
fn check_tiling(sorted: &[&RingEntry]) -> Result<()> {
    if let [only] = sorted {
        return if only.range.is_full_ring() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "single topology range {} does not cover the ring",
                only.range
            )))
        };
    }

    let mut total = 0u128;
    for (i, entry) in sorted.iter().enumerate() {
        if entry.range.is_full_ring() {
            return Err(Error::Configuration(format!(
                "full-ring range {} overlaps other ranges",
                entry.range
            )));
        }
        let next = sorted[(i + 1) % sorted.len()];
        if entry.range.end != next.range.start {
            return Err(Error::Configuration(format!(
                "topology ranges {} and {} leave a gap or overlap",
                entry.range, next.range
            )));
        }
        total += entry.range.span();
    }

    if total != RING_SPAN {
        return Err(Error::Configuration(
            "topology ranges wrap the ring more than once".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::token::Token;

    fn entry(start: i64, end: i64, hosts: &[&str]) -> RingEntry {
        RingEntry::new(
            TokenRange::new(Token(start), Token(end)),
            hosts.iter().map(|h| h.to_string()).collect(),
        )
    }

    #[test]
    fn test_full_ring_into_four() {
        let topology = vec![RingEntry::new(TokenRange::full_ring(), vec!["10.0.0.1".into()])];
        let partitions = TokenRangeSplitter::new(4).split(&topology).unwrap();

        assert_eq!(partitions.len(), 4);
        for p in &partitions {
            assert!(p.range.span() <= RING_SPAN / 4);
            assert_eq!(p.replicas.len(), 1);
        }
        // consecutive ranges chain back to the original
        assert_eq!(partitions[0].range.start, Token::MIN);
        for pair in partitions.windows(2) {
            assert_eq!(pair[0].range.end, pair[1].range.start);
        }
        assert_eq!(partitions[3].range.end, Token::MIN);
        let indices: Vec<_> = partitions.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_ring_order_and_replicas() {
        let topology = vec![
            entry(0, i64::MIN, &["b", "c"]),
            entry(i64::MIN, 0, &["a", "b", "a"]),
        ];
        let partitions = TokenRangeSplitter::new(2).split(&topology).unwrap();
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].range.start, Token::MIN);
        let first: Vec<_> = partitions[0].replicas.iter().map(String::as_str).collect();
        assert_eq!(first, vec!["a", "b"]);
    }

    #[test]
    fn test_small_ranges_kept() {
        let topology = vec![
            entry(0, 1, &["a"]),
            entry(1, 0, &["b"]),
        ];
        let partitions = TokenRangeSplitter::new(8).split(&topology).unwrap();
        assert_eq!(partitions[0].range, TokenRange::new(Token(0), Token(1)));
        assert!(partitions.iter().all(|p| p.range.span() <= RING_SPAN / 8));
        assert_eq!(partitions.len(), 9);
    }

    #[test]
    fn test_deterministic() {
        let topology = vec![entry(10, -10, &["a"]), entry(-10, 10, &["b"])];
        let splitter = TokenRangeSplitter::new(5);
        assert_eq!(splitter.split(&topology).unwrap(), splitter.split(&topology).unwrap());
    }

    #[test]
    fn test_configuration_errors() {
        let topology = vec![RingEntry::new(TokenRange::full_ring(), vec![])];
        assert!(matches!(
            TokenRangeSplitter::new(0).split(&topology),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            TokenRangeSplitter::new(4).split(&[]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_gaps_and_overlaps() {
        let gap = vec![entry(0, 100, &["a"]), entry(200, 0, &["b"])];
        assert!(TokenRangeSplitter::new(2).split(&gap).is_err());

        let overlap = vec![entry(0, 100, &["a"]), entry(50, 0, &["b"])];
        assert!(TokenRangeSplitter::new(2).split(&overlap).is_err());

        let partial = vec![entry(0, 100, &["a"])];
        assert!(TokenRangeSplitter::new(2).split(&partial).is_err());
    }
}
