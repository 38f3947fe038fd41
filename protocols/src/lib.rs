pub mod ds2;
pub mod error;
pub mod secure;
pub mod terminal_type;

pub use error::FrameError;
