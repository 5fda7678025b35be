//! Guardpost — a guarded conversational engagement engine.
//!
//! Accepts chat messages from web and SMS channels, runs them through a
//! deterministic guardrail pipeline before and after every model call, and
//! captures sales leads along the way. Built for a children's-education
//! business where a single unsafe or hallucinated reply is unacceptable.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod format;
pub mod guardrails;
pub mod lead;
pub mod logging;
pub mod pipeline;
pub mod providers;
pub mod sanitize;
pub mod server;
pub mod store;
