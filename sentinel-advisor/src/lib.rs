#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! # Sentinel-Advisor
//! Turns [`MarketAggregate`](sentinel_data::MarketAggregate)s into trading recommendations.
//!
//! * [`cycle::AnalysisCycle`]: acquire, ask a [`engine::ReasoningEngine`] for a
//!   [`recommendation::Recommendation`], then optionally [`notify::Notify`] a chat webhook.
//!   Only acquisition failure fails a cycle; market data survives downstream failures.
//! * [`scheduler::Scheduler`]: fixed-interval runs with manual triggers, at most one cycle
//!   in flight.
//! * [`config::Settings`]: persisted user settings with environment overrides.

/// All [`Error`](std::error::Error)s generated downstream of data acquisition.
pub mod error;

/// Persisted [`Settings`](config::Settings).
pub mod config;

/// Structured [`Recommendation`](recommendation::Recommendation) contract and parser.
pub mod recommendation;

/// System instruction and user message sent to reasoning engines.
pub mod prompt;

/// [`ReasoningEngine`](engine::ReasoningEngine) implementations.
pub mod engine;

/// Chat webhook [`Notify`](notify::Notify) implementation and message formatting.
pub mod notify;

pub mod cycle;

pub mod scheduler;
