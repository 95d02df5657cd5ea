pub mod cluster;
pub mod config;
pub mod error;
pub mod io;
pub mod paths;
pub mod port_forward;
pub mod process;
pub mod profile;
pub mod rollout;
pub mod supervisor;
pub mod teardown;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{ClusterError, KdevError, Result};
