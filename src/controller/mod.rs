//! Controller input handling
//!
//! Two input paths end in the same canonical event:
//!
//! 1. [`payload`] - normalization of raw `(topic, bytes)` messages
//! 2. [`debug_input`] - keyboard substitution read from stdin
//!
//! # Architecture
//!
//! ```text
//! MQTT message ─────────────┐
//!                           ├──► normalize() ──► ControllerEvent
//! stdin key ──► synthetic ──┘
//!               payload
//! ```
//!
//! The debug path produces byte payloads that are indistinguishable from
//! transport messages, so pairing and race logic never special-case it.

pub mod debug_input;
pub mod payload;

pub use debug_input::{DebugCommand, DebugKeys};
pub use payload::{normalize, ControllerEvent, EventKind};
