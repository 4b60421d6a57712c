//! JSON bodies exchanged with the remote HTTP services

pub mod domains;
pub mod store;

pub use domains::*;
pub use store::*;
