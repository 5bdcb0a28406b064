//! Seeded multiply-rotate-mix hashes (XXH32 / XXH64).
//!
//! Both functions are pure over `(bytes, seed)`. Words are read little-endian so the
//! result is identical on every platform.

/// Seed used for message identifiers unless a deployment overrides it.
pub const DEFAULT_SEED: u32 = 0;

const PRIME32_1: u32 = 2_654_435_761;
const PRIME32_2: u32 = 2_246_822_519;
const PRIME32_3: u32 = 3_266_489_917;
const PRIME32_4: u32 = 668_265_263;
const PRIME32_5: u32 = 374_761_393;

const PRIME64_1: u64 = 11_400_714_785_074_694_791;
const PRIME64_2: u64 = 14_029_467_366_897_019_727;
const PRIME64_3: u64 = 1_609_587_929_392_839_161;
const PRIME64_4: u64 = 9_650_029_242_287_828_579;
const PRIME64_5: u64 = 2_870_177_450_012_600_261;

/// Compute the 32-bit hash of `input`.
pub fn hash32(input: &[u8], seed: u32) -> u32 {
    let len = input.len();
    let mut rest = input;

    let mut hash = if len >= 16 {
        let mut acc = [
            seed.wrapping_add(PRIME32_1).wrapping_add(PRIME32_2),
            seed.wrapping_add(PRIME32_2),
            seed,
            seed.wrapping_sub(PRIME32_1),
        ];

        let mut blocks = rest.chunks_exact(16);
        for block in &mut blocks {
            for (lane, word) in acc.iter_mut().zip(block.chunks_exact(4)) {
                *lane = round32(*lane, read_u32(word));
            }
        }
        rest = blocks.remainder();

        acc[0]
            .rotate_left(1)
            .wrapping_add(acc[1].rotate_left(7))
            .wrapping_add(acc[2].rotate_left(12))
            .wrapping_add(acc[3].rotate_left(18))
    } else {
        seed.wrapping_add(PRIME32_5)
    };

    // Only the low 32 bits of the length take part, matching the reference.
    hash = hash.wrapping_add(len as u32);

    let mut words = rest.chunks_exact(4);
    for word in &mut words {
        hash = hash.wrapping_add(read_u32(word).wrapping_mul(PRIME32_3));
        hash = hash.rotate_left(17).wrapping_mul(PRIME32_4);
    }

    for &byte in words.remainder() {
        hash = hash.wrapping_add(u32::from(byte).wrapping_mul(PRIME32_5));
        hash = hash.rotate_left(11).wrapping_mul(PRIME32_1);
    }

    avalanche32(hash)
}

/// Compute the 64-bit hash of `input`.
pub fn hash64(input: &[u8], seed: u64) -> u64 {
    let len = input.len();
    let mut rest = input;

    let mut hash = if len >= 32 {
        let mut acc = [
            seed.wrapping_add(PRIME64_1).wrapping_add(PRIME64_2),
            seed.wrapping_add(PRIME64_2),
            seed,
            seed.wrapping_sub(PRIME64_1),
        ];

        let mut blocks = rest.chunks_exact(32);
        for block in &mut blocks {
            for (lane, word) in acc.iter_mut().zip(block.chunks_exact(8)) {
                *lane = round64(*lane, read_u64(word));
            }
        }
        rest = blocks.remainder();

        let mut hash = acc[0]
            .rotate_left(1)
            .wrapping_add(acc[1].rotate_left(7))
            .wrapping_add(acc[2].rotate_left(12))
            .wrapping_add(acc[3].rotate_left(18));
        for lane in acc {
            hash = merge64(hash, lane);
        }
        hash
    } else {
        seed.wrapping_add(PRIME64_5)
    };

    hash = hash.wrapping_add(len as u64);

    let mut words = rest.chunks_exact(8);
    for word in &mut words {
        hash ^= round64(0, read_u64(word));
        hash = hash
            .rotate_left(27)
            .wrapping_mul(PRIME64_1)
            .wrapping_add(PRIME64_4);
    }
    rest = words.remainder();

    if rest.len() >= 4 {
        let (word, tail) = rest.split_at(4);
        hash ^= u64::from(read_u32(word)).wrapping_mul(PRIME64_1);
        hash = hash
            .rotate_left(23)
            .wrapping_mul(PRIME64_2)
            .wrapping_add(PRIME64_3);
        rest = tail;
    }

    for &byte in rest {
        hash ^= u64::from(byte).wrapping_mul(PRIME64_5);
        hash = hash.rotate_left(11).wrapping_mul(PRIME64_1);
    }

    avalanche64(hash)
}

fn round32(acc: u32, word: u32) -> u32 {
    acc.wrapping_add(word.wrapping_mul(PRIME32_2))
        .rotate_left(13)
        .wrapping_mul(PRIME32_1)
}

fn round64(acc: u64, word: u64) -> u64 {
    acc.wrapping_add(word.wrapping_mul(PRIME64_2))
        .rotate_left(31)
        .wrapping_mul(PRIME64_1)
}

fn merge64(hash: u64, lane: u64) -> u64 {
    (hash ^ round64(0, lane))
        .wrapping_mul(PRIME64_1)
        .wrapping_add(PRIME64_4)
}

fn avalanche32(mut hash: u32) -> u32 {
    hash ^= hash >> 15;
    hash = hash.wrapping_mul(PRIME32_2);
    hash ^= hash >> 13;
    hash = hash.wrapping_mul(PRIME32_3);
    hash ^ (hash >> 16)
}

fn avalanche64(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(PRIME64_2);
    hash ^= hash >> 29;
    hash = hash.wrapping_mul(PRIME64_3);
    hash ^ (hash >> 32)
}

// Callers always pass exact-size chunks.
fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}
