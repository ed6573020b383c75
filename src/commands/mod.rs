//! CLI command implementations

pub mod balance;
pub mod clock;
pub mod run;
