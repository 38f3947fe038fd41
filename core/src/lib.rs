pub mod enumeration;
pub mod network;
pub mod retry;
pub mod scanner;
pub mod transfer;
pub mod transport;
