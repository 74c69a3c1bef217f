//! Command implementations

pub mod check;
pub mod inspect;
pub mod manifest;
pub mod pack;
