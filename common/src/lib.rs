pub mod config;
pub mod error;
pub mod model;
pub mod network;
pub mod signal;

pub use error::{Error, Result, TransferFailure};

/// Logs a positive outcome. The CLI formatter renders these with the `[+]` marker.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        ::tracing::info!(target: "dknw::success", $($arg)*)
    };
}
