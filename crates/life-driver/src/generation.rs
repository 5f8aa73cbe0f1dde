//! Received generations and their console rendering

use life_chip::grid;
use life_chip::map::GENERATION_BYTES;
use std::fmt;

/// One generation as received from the accelerator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    index: u64,
    block: [u8; GENERATION_BYTES],
}

impl Generation {
    /// Wrap a received block
    pub const fn new(index: u64, block: [u8; GENERATION_BYTES]) -> Self {
        Self { index, block }
    }

    /// Generation number (0 is the injected state)
    pub const fn index(&self) -> u64 {
        self.index
    }

    /// Raw bytes in arrival order
    pub const fn block(&self) -> &[u8; GENERATION_BYTES] {
        &self.block
    }

    /// The block read as a state word (first byte most significant)
    pub const fn state(&self) -> u64 {
        u64::from_be_bytes(self.block)
    }

    /// Live cells
    pub const fn population(&self) -> u32 {
        self.state().count_ones()
    }

    /// Whether the cell at `(row, col)` is alive
    pub const fn cell(&self, row: usize, col: usize) -> bool {
        grid::cell(self.state(), row, col)
    }

    /// Hex dump line, e.g. `00 00 00 00 00 c0 60 80`
    pub fn hex(&self) -> String {
        self.block
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Hex dump, then one line of bits per byte (MSB first), then a blank line
impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data received in DDR: {}", self.hex())?;
        for byte in self.block {
            let bits: Vec<&str> = (0..8)
                .rev()
                .map(|j| if (byte >> j) & 1 == 1 { "1" } else { "0" })
                .collect();
            writeln!(f, "{}", bits.join(" "))?;
        }
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLIDER: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0x60, 0x80];

    #[test]
    fn hex_dump_in_arrival_order() {
        let g = Generation::new(0, GLIDER);
        assert_eq!(g.hex(), "00 00 00 00 00 c0 60 80");
        assert_eq!(g.state(), 0x0000_0000_00C0_6080);
    }

    #[test]
    fn rendering_has_ten_lines() {
        let text = Generation::new(0, GLIDER).to_string();
        let lines: Vec<&str> = text.split('\n').collect();
        // hex line, 8 bit rows, blank line, trailing empty split
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], "Data received in DDR: 00 00 00 00 00 c0 60 80");
        assert_eq!(lines[1], "0 0 0 0 0 0 0 0");
        assert_eq!(lines[6], "1 1 0 0 0 0 0 0");
        assert_eq!(lines[7], "0 1 1 0 0 0 0 0");
        assert_eq!(lines[8], "1 0 0 0 0 0 0 0");
        assert_eq!(lines[9], "");
    }

    #[test]
    fn cells_follow_grid_layout() {
        let g = Generation::new(3, GLIDER);
        assert_eq!(g.population(), 5);
        assert!(g.cell(6, 2));
        assert!(!g.cell(6, 0));
        assert_eq!(g.index(), 3);
    }
}
