//! Utils module - Utility functions and helpers

pub mod clock;
pub mod logging;
