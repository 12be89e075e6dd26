//! Hierarchical bin arithmetic for the six-level, eight-way BAI binning
//! scheme. Level 0 is the finest (2^14-base bins), level 5 the coarsest
//! (a single 2^29-base bin).

use std::ops::Range;

/// Bit shift of the finest bin size.
pub const MIN_SHIFT: u32 = 14;
/// Bit shift between consecutive levels.
pub const LEVEL_STEP_SHIFT: u32 = 3;
/// Highest level index.
pub const MAX_LEVEL: u32 = 5;
pub const NUM_LEVELS: u32 = MAX_LEVEL + 1;
/// Width of a finest-level bin and of a linear index window.
pub const MIN_BIN_SIZE: u32 = 1 << MIN_SHIFT;
/// Width of the single coarsest bin.
pub const MAX_BIN_SIZE: u32 = MIN_BIN_SIZE << (LEVEL_STEP_SHIFT * MAX_LEVEL);
/// First finest-level bin number (octal 011111).
pub const BIN_NUMBER_BASE: u32 = 4681;
/// Pseudo-bin carrying the unmapped chunk and read counts.
pub const PSEUDO_BIN: u32 = 37450;

pub const fn bin_shift(level: u32) -> u32 {
    MIN_SHIFT + LEVEL_STEP_SHIFT * level
}

pub const fn bin_size(level: u32) -> u32 {
    1 << bin_shift(level)
}

pub const fn bin_number_base(level: u32) -> u32 {
    BIN_NUMBER_BASE >> (LEVEL_STEP_SHIFT * level)
}

/// Bin containing `pos` at `level`.
pub const fn bin_number(pos: u32, level: u32) -> u32 {
    bin_number_base(level) + (pos >> bin_shift(level))
}

/// Genomic interval `[from, to)` covered by `bin`.
pub fn bin_seq_range(bin: u32) -> Range<u64> {
    let mut bin = u64::from(bin);
    let mut len: u64 = 1 << 29;
    let mut count: u64 = 1;
    while bin >= count {
        bin -= count;
        len >>= LEVEL_STEP_SHIFT;
        count <<= LEVEL_STEP_SHIFT;
    }
    let from = bin * len;
    from..from + len
}

/// Inclusive bin-number range probed at `level` for positions
/// `[from, last]` (`last` inclusive).
pub const fn level_bins(from: u32, last: u32, level: u32) -> (u32, u32) {
    (bin_number(from, level), bin_number(last, level))
}
