//! A load generator that uploads a single file many times concurrently.
//!
//! Each upload streams the file as a `multipart/form-data` request body. The file is read in
//! fixed-size chunks with an artificial delay after every chunk, which simulates slow clients and
//! keeps many requests open on the server at the same time.
//!
//! The pieces, from the bottom up:
//!
//! - [`chunks`] reads the file in throttled chunks.
//! - [`multipart`] frames those chunks as a single file field.
//! - [`bridge`] connects the producer of the body with the HTTP request streaming it.
//! - [`upload`] performs one upload and reports its outcome.
//! - [`driver`] runs all uploads concurrently and aggregates a [`Summary`].
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod bridge;
pub mod chunks;
pub mod cli;
pub mod config;
pub mod driver;
mod error;
pub mod headers;
pub mod multipart;
pub mod observability;
pub mod report;
pub mod source;
pub mod upload;

pub use crate::driver::run;
pub use crate::error::{Error, Result};
pub use crate::report::Summary;
