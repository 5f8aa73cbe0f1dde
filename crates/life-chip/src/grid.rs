//! Grid geometry and the reference automaton rule.
//!
//! The accelerator holds an 8×8 toroidal grid as one 64-bit word. It streams
//! the word most-significant byte first, so byte `i` of a received block is
//! row `i`, and within a row the most significant bit is column 0.
//!
//! ```text
//! 0x0000_0000_00C0_6080
//!   row 5  c0  1 1 0 0 0 0 0 0
//!   row 6  60  0 1 1 0 0 0 0 0
//!   row 7  80  1 0 0 0 0 0 0 0
//! ```
//!
//! The rule is Conway's B3/S23 with wrap-around edges. [`step`] is the
//! software model used by the simulated board and by hardware parity checks.

/// Rows in the grid.
pub const ROWS: usize = 8;
/// Columns in the grid.
pub const COLS: usize = 8;

/// Split a state into the `(low, high)` words written to the data ports.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn split(state: u64) -> (u32, u32) {
    ((state & 0xFFFF_FFFF) as u32, (state >> 32) as u32)
}

/// Rebuild a state from the words latched by the data ports.
#[must_use]
pub const fn join(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

const fn bit_index(row: usize, col: usize) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let linear = (row * COLS + col) as u32;
    63 - linear
}

/// Whether the cell at `(row, col)` is alive.
#[must_use]
pub const fn cell(state: u64, row: usize, col: usize) -> bool {
    (state >> bit_index(row % ROWS, col % COLS)) & 1 == 1
}

fn live_neighbours(state: u64, row: usize, col: usize) -> u32 {
    let mut count = 0;
    for dr in [ROWS - 1, 0, 1] {
        for dc in [COLS - 1, 0, 1] {
            if dr == 0 && dc == 0 {
                continue;
            }
            if cell(state, row + dr, col + dc) {
                count += 1;
            }
        }
    }
    count
}

/// Advance the grid by one generation.
#[must_use]
pub fn step(state: u64) -> u64 {
    let mut next = 0u64;
    for row in 0..ROWS {
        for col in 0..COLS {
            let n = live_neighbours(state, row, col);
            let alive = cell(state, row, col);
            if n == 3 || (alive && n == 2) {
                next |= 1 << bit_index(row, col);
            }
        }
    }
    next
}
