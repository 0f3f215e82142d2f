//! CLI command implementations.

pub mod authdata;
pub mod challenge;
pub mod inspect;
