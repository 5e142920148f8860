//! PHIL - AI agent builder backend
//!
//! Users describe an agent in plain language (or step through a wizard), and
//! PHIL asks a search-grounded LLM to write the Python for it, then reviews
//! the result for technical quality and running cost.
//!
//! # Overview
//!
//! - [`wizard`]: the catalog of approaches, frameworks, providers and storage
//!   choices, with the documentation each one is grounded on
//! - [`studio`]: every LLM operation (recommend, generate, chat, review,
//!   cost analysis, personality restyle)
//! - [`storage`]: users and agents in Supabase (PostgREST) or memory
//! - [`auth`]: bearer tokens verified against Supabase Auth
//! - [`api`]: the warp HTTP surface
//!
//! # Quick Start
//!
//! ```rust
//! use phil::wizard::{Framework, WizardConfig};
//!
//! let config = WizardConfig {
//!     approach: "Single Agent".to_string(),
//!     framework: "LangGraph".to_string(),
//!     ..Default::default()
//! };
//!
//! assert_eq!(config.framework(), Some(Framework::Langgraph));
//! assert!(!config.is_complete());
//! assert!(config.missing_fields().contains(&"llmProvider"));
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod llm;
pub mod markup;
pub mod observability;
pub mod prompts;
pub mod storage;
pub mod studio;
pub mod testing;
pub mod wizard;

pub use api::AppState;
pub use config::*;
pub use error::{PhilError, PhilResult};
pub use storage::{Agent, AgentStore, User};
pub use studio::Studio;
pub use wizard::WizardConfig;
