//! Testing utilities and mock implementations
//!
//! Mocks for the LLM provider and token verification, so the service can be
//! tested without Perplexity or Supabase.

pub mod mocks;

pub use mocks::*;
