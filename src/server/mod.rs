//! Tool catalog and dispatch.

pub mod handlers;
pub mod tools;

pub use handlers::common::ToolContext;
