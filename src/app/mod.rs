//! Play application
//!
//! Owns the pairing registry and the race session and routes every input to
//! them according to the current view:
//!
//! ```text
//!            games                 race (both drawings)
//! Stage ─────────────► GameSelection ─────────────────────► Race
//!   ▲                      │  race (drawings missing)         │
//!   │                      ▼                                  │
//!   │                 RaceWaiting ──(second player pairs)─────┘
//!   │                      │
//!   └──────── back ────────┴──────────────────────────────────┘
//! ```
//!
//! Leaving a race view with `back` clears every pairing.
//!
//! [`play::PlayApp`] is the synchronous state holder, [`runner`] drives it from
//! a single `tokio::select!` loop, [`render`] logs the published frames.

pub mod play;
pub mod render;
pub mod runner;

pub use play::{Control, FrameSnapshot, PlayApp, View};
pub use runner::{run_play_loop, PlayInputs};
