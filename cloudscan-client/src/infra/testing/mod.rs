//! Test doubles for driving the job client deterministically
//!
//! - **Time**: [`VirtualTimeProvider`] only fires sleeps when a test advances it
//! - **Stubs**: scripted [`StubTransport`] and a [`FlakyHandleSlot`] whose
//!   writes can be made to fail
//!
//! These are public so integration tests and downstream crates can build a
//! [`JobClient`](crate::JobClient) without a live worker.

pub mod stubs;
pub mod time;

pub use stubs::{FlakyHandleSlot, StubTransport};
pub use time::VirtualTimeProvider;
