pub mod ds2_terminal;
pub mod memory;
pub mod secure_terminal;

use dknw_protocols::secure::{DeviceProfile, ItemCodes, NetworkType};

pub use ds2_terminal::{Ds2Behaviour, Ds2Terminal};
pub use memory::{MemoryFactory, MemoryTerminal};
pub use secure_terminal::{SecureBehaviour, SecureTerminal};

/// A device profile with made-up item codes and a scrambled cipher table.
pub fn test_profile(network: NetworkType) -> DeviceProfile {
    let items = ItemCodes {
        system_id: 0x0101,
        protocol_id: 0x0102,
        client_side: 0x0103,
        job_id: 0x0104,
        auth_req: 0x0201,
        auth_res: 0x0202,
        file_operation: 0x0301,
        file_number: 0x0302,
        expect_file_size: 0x0303,
    };
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = (i as u8).wrapping_mul(167).wrapping_add(13);
    }
    DeviceProfile::new(network, items, table)
}

/// Deterministic filler so payload mix-ups show up as content mismatches.
pub fn payload(seed: u32, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u32).wrapping_mul(31).wrapping_add(seed) as u8)
        .collect()
}
