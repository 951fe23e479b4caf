//! Two-player race minigame
//!
//! Implements the race as a typestate machine driven by discrete impulses:
//!
//! 1. [`impulse`] - edge detection, one press registers one step
//! 2. [`machine`] - the `Ready -> Racing -> Finished` lifecycle
//!
//! # State Machine
//!
//! ```text
//! Ready ──(countdown 3,2,1)──► Racing ──(first to WINNING_POSITION)──► Finished
//!   ▲                                                                    │
//!   └──────────────────────────────── reset ─────────────────────────────┘
//! ```
//!
//! Edges are processed in batches; inside a batch player 1 goes before player 2,
//! which makes same-batch photo finishes deterministic.

pub mod impulse;
pub mod machine;

pub use impulse::Impulse;
pub use machine::{RacePhase, RaceSession, RaceSettings, RaceState};
