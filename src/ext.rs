//! Extension contracts consulted by the dispatch client.

pub mod rate_limit;

pub use rate_limit::*;
