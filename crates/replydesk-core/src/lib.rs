//! # Replydesk Core
//!
//! Shared, I/O-free logic for Replydesk: template records, corpus
//! normalization, eligibility rules, the retrieval index, and reply
//! composition.
//!
//! This crate contains no tokio, sqlx, mail transport, or HTTP
//! dependencies. Everything that talks to the outside world is reached
//! through a trait ([`embedding::EmbeddingProvider`],
//! [`compose::TextGenerator`], [`store::IndexStore`]) implemented by the
//! `replydesk` application crate.

pub mod compose;
pub mod eligibility;
pub mod embedding;
pub mod index;
pub mod models;
pub mod normalize;
pub mod store;
