//! LLM provider abstraction layer
//!
//! This module provides a provider-agnostic interface for chat completions.
//! PHIL talks to Perplexity; tests substitute a scripted mock.

pub mod provider;
pub mod providers;

pub use provider::*;
pub use providers::*;
