//! Challenge-response transform used during the secure handshake.

pub const TABLE_LEN: usize = 256;
const ROUNDS: usize = 17;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeCipher {
    table: [u8; TABLE_LEN],
}

impl ChallengeCipher {
    pub fn new(table: [u8; TABLE_LEN]) -> Self {
        Self { table }
    }

    /// Answer to a challenge. Output length always equals input length.
    pub fn respond(&self, challenge: &[u8]) -> Vec<u8> {
        let mut cursor = TableCursor {
            table: &self.table,
            index: (popcount(challenge) % TABLE_LEN as u32) as u8,
        };

        let mut block: Vec<u8> = challenge.to_vec();
        for _ in 0..ROUNDS {
            block = round(&block, &mut cursor);
        }
        block
    }
}

struct TableCursor<'a> {
    table: &'a [u8; TABLE_LEN],
    index: u8,
}

impl TableCursor<'_> {
    fn next(&mut self) -> u8 {
        let value: u8 = self.table[usize::from(self.index)];
        self.index = self.index.wrapping_add(1);
        value
    }
}

fn round(input: &[u8], cursor: &mut TableCursor<'_>) -> Vec<u8> {
    let mut block: Vec<u8> = input.iter().map(|byte| byte ^ cursor.next()).collect();

    let shift: usize = popcount(&block) as usize;
    block = rotate_left(&block, shift);

    for byte in block.iter_mut() {
        *byte ^= cursor.next();
        *byte = byte.reverse_bits();
    }
    block
}

fn popcount(data: &[u8]) -> u32 {
    data.iter().map(|byte| byte.count_ones()).sum()
}

/// Rotates the whole buffer left by `count` bits, most significant bit first.
fn rotate_left(data: &[u8], count: usize) -> Vec<u8> {
    let n_bits: usize = data.len() * 8;
    let mut result: Vec<u8> = vec![0u8; data.len()];
    if n_bits == 0 {
        return result;
    }

    for position in 0..n_bits {
        let source: usize = (count + position) % n_bits;
        if data[source >> 3] & (0x80 >> (source & 7)) != 0 {
            result[position >> 3] |= 0x80 >> (position & 7);
        }
    }
    result
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
