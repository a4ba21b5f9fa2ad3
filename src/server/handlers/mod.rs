pub mod common;
pub mod files;
pub mod github;
