//! Consistent hash ring used for client affinity.
//!
//! Every configured endpoint owns `virtual_nodes` points on a 64-bit ring.
//! A key maps to the first point at or after its hash (wrapping), skipping
//! points whose endpoint is not eligible. When an endpoint leaves the eligible
//! set only the keys it owned move; everyone else keeps their endpoint.

use crate::backend::EndpointId;
use fnv::FnvHasher;
use std::hash::Hasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct VirtualNode {
    hash: u64,
    slot: usize,
}

/// Ring of virtual nodes over the full configured pool.
#[derive(Debug, Clone)]
pub struct HashRing {
    nodes: Vec<VirtualNode>,
    slots: usize,
}

impl HashRing {
    /// Build the ring. `ids` must be in configured order.
    pub fn new(ids: &[EndpointId], virtual_nodes: u32) -> Self {
        let virtual_nodes = virtual_nodes.max(1);
        let mut nodes = Vec::with_capacity(ids.len() * virtual_nodes as usize);

        for (slot, id) in ids.iter().enumerate() {
            for replica in 0..virtual_nodes {
                let label = format!("{}#{}", id, replica);
                nodes.push(VirtualNode {
                    hash: hash_key(label.as_bytes()),
                    slot,
                });
            }
        }

        nodes.sort_unstable();

        Self {
            nodes,
            slots: ids.len(),
        }
    }

    /// Number of endpoints the ring was built for.
    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Slot owning `key_hash`, considering only slots for which `eligible`
    /// returns true.
    pub fn lookup(&self, key_hash: u64, eligible: impl Fn(usize) -> bool) -> Option<usize> {
        let start = self.nodes.partition_point(|node| node.hash < key_hash);

        self.nodes
            .iter()
            .cycle()
            .skip(start)
            .take(self.nodes.len())
            .map(|node| node.slot)
            .find(|&slot| eligible(slot))
    }
}

/// Hash a client key: FNV-1a followed by the murmur3 64-bit finalizer, so
/// keys that differ in one byte land far apart on the ring.
pub fn hash_key(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(bytes);
    fmix64(hasher.finish())
}

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    k ^= k >> 33;
    k
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u16) -> Vec<EndpointId> {
        (0..n)
            .map(|i| format!("127.0.0.1:{}", 9000 + i).parse().unwrap())
            .collect()
    }

    #[test]
    fn test_ring_size() {
        let ring = HashRing::new(&ids(4), 10);
        assert_eq!(ring.len(), 40);
        assert_eq!(ring.slots(), 4);
    }

    #[test]
    fn test_lookup_is_deterministic() {
        let ring = HashRing::new(&ids(5), 100);
        let h = hash_key(b"10.0.0.7");
        assert_eq!(ring.lookup(h, |_| true), ring.lookup(h, |_| true));
    }

    #[test]
    fn test_lookup_wraps_past_last_node() {
        let ring = HashRing::new(&ids(3), 10);
        assert!(ring.lookup(u64::MAX, |_| true).is_some());
    }

    #[test]
    fn test_lookup_skips_ineligible() {
        let ring = HashRing::new(&ids(3), 50);
        for i in 0..100 {
            let h = hash_key(format!("client-{}", i).as_bytes());
            assert_eq!(ring.lookup(h, |slot| slot == 2), Some(2));
        }
        assert_eq!(ring.lookup(0, |_| false), None);
    }

    #[test]
    fn test_avalanche() {
        // Adjacent keys should differ in roughly half their bits
        let total: u32 = (0..200u32)
            .map(|i| {
                let a = hash_key(format!("10.0.{}.{}", i / 256, i % 256).as_bytes());
                let b = hash_key(format!("10.0.{}.{}", (i + 1) / 256, (i + 1) % 256).as_bytes());
                (a ^ b).count_ones()
            })
            .sum();
        let average = total as f64 / 200.0;
        assert!((28.0..=36.0).contains(&average), "average {} bits differ", average);
    }
}
