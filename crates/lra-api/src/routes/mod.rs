//! # API Route Modules
//!
//! - `lra`: the coordination protocol: start, join, leave, close, cancel,
//!   status, info, list and the recovery view.

pub mod lra;
