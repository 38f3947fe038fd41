pub mod address;
pub mod probe;
pub mod terminal;

pub use address::{Address, AddressIter, AddressSpace, FileSelector};
pub use probe::{ProbeResult, ProbeStatus};
pub use terminal::{Protocol, ProtocolKind, Terminal};
