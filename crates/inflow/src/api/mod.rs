//! Upstream API access: GraphQL transport, response envelope, and errors.

pub mod client;
pub mod envelope;
pub mod error;

pub use client::{CredentialProvider, GraphClient, HttpGraphClient, StaticCredentials};
pub use envelope::{
    summarize_errors, Connection, GraphEnvelope, GraphErrorItem, PageInfo, RateLimitBlock,
};
pub use error::ApiError;
