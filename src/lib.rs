//! ArticleCraft - article recommendation and retrieval-augmented writing
//!
//! Indexes an article corpus for content-based recommendations, selects
//! diverse representative samples from large corpora, and drafts new articles
//! grounded in the most similar existing ones.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod recommend;
pub mod sampler;
pub mod server;
pub mod service;

pub use error::{ArticleCraftError, Result};
