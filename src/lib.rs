//! Tileboard: message generation and delivery for a 6x22 split-flap board
//!
//! Generators produce short messages through AI providers; a retry/failover engine guarded
//! by per-provider circuit breakers keeps content flowing through outages, and a validator
//! guarantees every message fits the board's glyph set and geometry before delivery.

pub mod bootstrap;
pub mod circuit;
pub mod cli;
pub mod config;
pub mod content;
pub mod display;
pub mod error;
pub mod generator;
pub mod logging;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod scheduler;
