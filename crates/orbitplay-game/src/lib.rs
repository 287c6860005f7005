//! Reference deterministic game for orbitplay sessions.
//!
//! [`GravityWell`] implements the netplay state contract with integer-only
//! physics and a serialized RNG, so two peers fed the same inputs stay
//! bit-identical. [`ClickReader`] and [`ScriptedClicks`] are the input
//! sources a session polls.

pub mod body;
pub mod canvas;
pub mod fixed;
pub mod game;
pub mod input;
pub mod rng;

pub use canvas::AsciiCanvas;
pub use game::GravityWell;
pub use input::{ClickHandle, ClickInput, ClickReader, ScriptedClicks};
