//! Hash functions the routing core depends on for exact, reproducible placement.
//!
//! Routing correctness depends on these being bit-for-bit identical across
//! restarts and deployments, so both are specified explicitly rather than
//! left to a hasher a crate upgrade could change underneath us.

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a, 64-bit variant: byte-wise XOR-then-multiply.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// CRC32/IEEE (the polynomial 802.3 Ethernet checksums use), for node ids.
///
/// This is deliberately the IEEE polynomial and not Castagnoli: a node id
/// derived from the wrong polynomial would not match the canonical id a
/// migrating deployment expects. See DESIGN.md.
pub fn crc32_ieee(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fnv1a_64_matches_known_vectors() {
        // Empty string hashes to the offset basis.
        assert_eq!(fnv1a_64(b""), FNV_OFFSET_BASIS);
        // Known FNV-1a 64-bit test vector for "a".
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn crc32_ieee_matches_known_vector() {
        // Standard CRC-32/IEEE check value for "123456789".
        assert_eq!(crc32_ieee(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn routing_determinism() {
        let name = b"weather";
        let h1 = fnv1a_64(name);
        let h2 = fnv1a_64(name);
        assert_eq!(h1, h2);
    }
}
