//! s3fetch - minimal S3 GET client with SigV2 signing and bounded retry

pub mod config;
pub mod s3;

pub use config::{Config, Credentials};
pub use s3::{Connection, S3Error, DEFAULT_RETRIES};
