//! AI Provider implementations
//!
//! Concrete implementations of the [`AIProvider`](crate::AIProvider) trait.

pub mod openai;

pub use openai::OpenAIProvider;
