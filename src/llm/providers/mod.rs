//! LLM provider implementations
//!
//! This module contains concrete implementations of the LlmProvider trait.

pub mod perplexity;

pub use perplexity::*;
