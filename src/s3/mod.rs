//! S3 GET client with AWS SigV2 signing
//!
//! This module provides:
//! - AWS Signature Version 2 signing for S3 requests
//! - The authenticated retrieval routine with bounded retry
//! - The HTTP transport seam (trait + hyper implementation)

pub mod client;
pub mod signer;
pub mod transport;

// Re-export main types for convenience
pub use client::{Connection, Result, S3Error, DEFAULT_RETRIES};
pub use signer::S3SignerV2;
pub use transport::{HyperTransport, ObjectSink, Transport};
