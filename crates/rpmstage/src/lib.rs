pub mod build;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod log_sanitize;
pub mod logging;
pub mod package;
pub mod patterns;
pub mod report;
pub mod resolve;
pub mod rpmbuild;
pub mod rpmrc;
pub mod tree;
pub mod util;
pub mod workspace;

pub use error::{Error, ErrorKind, Result};
