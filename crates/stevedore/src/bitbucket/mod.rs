//! Bitbucket Cloud integration.

pub mod client;
pub mod convert;
pub mod source;
pub mod types;

pub use client::{BASE_URL, BitbucketClient, PAGE_SIZE, PING_URL};
pub use source::BitbucketDataSource;
pub use types::Page;
