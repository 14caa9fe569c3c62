//! Provider-facing descriptors (data) and adapters (behavior).
//!
//! `descriptor` exposes validated metadata ([`ProviderDescriptor`]) covering the base URL,
//! auth strategy, retry policy, error envelope parser, and timeouts of one external API.
//! `adapter` binds a descriptor to a credential and exposes the `call` entry point.

pub mod adapter;
pub mod descriptor;

pub use adapter::*;
pub use descriptor::*;
