//! Core types shared across chainsight.
//!
//! This crate provides the leaf-level building blocks used by the tree builder
//! and the categorization engine:
//!
//! - [`Span`]: one recorded call-leg of a trace, as delivered by the collector
//! - [`LevelPath`]: the dotted hierarchical address of a span (`"0.1.2"`)
//! - [`generate_token`]: deterministic chain identifiers
//!
//! # Example
//!
//! ```rust
//! use chainsight_core::{generate_token, Span};
//!
//! let span = Span::new("trace-1", "0", 1, "/checkout/pay");
//! let path = span.level_path().unwrap();
//! assert_eq!(path.to_string(), "0.1");
//!
//! assert_eq!(generate_token("/checkout"), generate_token("/checkout"));
//! ```

mod level;
mod span;
mod token;

pub use level::{canonical_level, LevelError, LevelPath};
pub use span::Span;
pub use token::generate_token;
