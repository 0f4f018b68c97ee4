//! Public facade crate for `simple-search`.
//!
//! Re-exports the result types and provider traits from `simple-search-core`. With the
//! `local` feature, the HTTP fetcher and DuckDuckGo provider are available under [`local`].

pub use simple_search_core::*;

#[cfg(feature = "local")]
pub use simple_search_local as local;
