//! Line-delimited JSON-RPC over stdio.

pub mod protocol;
pub mod server;
