//! Fake terminals and the end-to-end tests that run the engines against them.

pub mod fake;

#[cfg(test)]
mod dual_channel;
#[cfg(test)]
mod scanning;
#[cfg(test)]
mod secure;
