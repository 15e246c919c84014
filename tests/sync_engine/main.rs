//! Synchronization engine integration tests on the in-memory medium.

mod support;
mod cross_context;
mod lifecycle;
