/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::Side;

/// Canonical identity of a position, used to index the [`crate::TTable`].
///
/// Positions reached through different move orders share a key, as long as the rules engine
/// hashes them identically. The side-to-move is kept alongside the hash so that two positions
/// with the same piece layout but different movers never alias.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    /// Hash of the position's piece layout, castling rights, en passant square, etc.
    hash: u64,

    /// Side whose turn it is.
    side: Side,
}

impl PositionKey {
    /// Creates a new [`PositionKey`] from a position hash and its side-to-move.
    #[inline(always)]
    pub const fn new(hash: u64, side: Side) -> Self {
        Self { hash, side }
    }

    /// The raw hash of this key.
    #[inline(always)]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    /// The side-to-move component of this key.
    #[inline(always)]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Maps this key onto one of `mask + 1` shards, where `mask + 1` is a power of two.
    ///
    /// The upper bits are used, since the lower bits of the hash are what the shard's own map hashes on.
    #[inline(always)]
    pub const fn shard(&self, mask: usize) -> usize {
        ((self.hash >> 32) as usize ^ self.side as usize) & mask
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}/{}", self.hash, self.side)
    }
}

impl fmt::Debug for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PositionKey({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_distinguishes_keys() {
        let white = PositionKey::new(0xDEAD_BEEF, Side::White);
        let black = PositionKey::new(0xDEAD_BEEF, Side::Black);
        assert_ne!(white, black);
        assert_eq!(white.hash(), black.hash());
    }

    #[test]
    fn test_shard_is_within_mask() {
        let mask = 15;
        for hash in [0, 1, u64::MAX, 0x1234_5678_9ABC_DEF0] {
            for side in [Side::White, Side::Black] {
                assert!(PositionKey::new(hash, side).shard(mask) <= mask);
            }
        }
    }
}
