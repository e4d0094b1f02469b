//! Client session state
//!
//! The phase machine and negotiated values live in [`SessionState`]; the
//! table of commands awaiting a reply lives in [`InvokeRegistry`].

pub mod invoke;
pub mod state;

pub use invoke::InvokeRegistry;
pub use state::{SessionPhase, SessionState};
