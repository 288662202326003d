//! Test-only support crate: shared in-memory repository doubles used by
//! the integration test suite under `tests/`.

pub mod common;
