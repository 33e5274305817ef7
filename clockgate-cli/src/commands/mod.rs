//! CLI command implementations.

pub mod admin;
pub mod clock;
pub mod history;
pub mod register;
pub mod status;
