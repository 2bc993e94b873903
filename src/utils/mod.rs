// Utility functions

pub mod spool;

pub use spool::*;
