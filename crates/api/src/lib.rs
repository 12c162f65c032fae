//! HTTP side of the coursework platform.
//!
//! [`Client`] talks to the authenticated REST API (upload targets,
//! submissions, upload confirmation). [`HttpTransferRuntime`] moves staged
//! file bodies to the upload host.

pub mod client;
pub mod runtime;

#[cfg(test)]
mod testing;

pub use client::{Client, Error, submission_files_path, submissions_path};
pub use runtime::HttpTransferRuntime;
