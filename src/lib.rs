//! Workspace root crate.
//!
//! Carries no implementation of its own; it exists to host the end-to-end
//! test suite under `tests/`, which exercises the gateway and workers
//! together through [`conveyor_shared`].
