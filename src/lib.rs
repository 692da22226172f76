//! # Replydesk
//!
//! An auto-reply agent for a customer-support mailbox. Replies are grounded
//! in a corpus of canned support answers and kept in the house style.
//!
//! ## Architecture
//!
//! ```text
//!  offline                                   runtime
//! ┌───────────┐  prepare  ┌──────────────┐   ┌─────────┐  fetch  ┌──────────────┐
//! │ emails.txt│──────────▶│ knowledge    │   │  IMAP   │────────▶│ eligibility  │
//! └───────────┘           │ base (JSON)  │   └─────────┘         └──────┬───────┘
//!                         └──────┬───────┘                              ▼
//!                                │ index build              ┌──────────────────┐
//!                                ▼                          │ retrieve top-k   │
//!                         ┌──────────────┐  query           │ compose reply    │
//!                         │ SQLite index │◀─────────────────│ throttle         │
//!                         └──────────────┘                  └────────┬─────────┘
//!                                                                    ▼ send
//!                                                               ┌─────────┐
//!                                                               │  SMTP   │
//!                                                               └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! replydesk prepare                 # emails.txt -> knowledge_base.json
//! replydesk index build             # embed templates into the index
//! replydesk draft "My payment failed"
//! replydesk run                     # poll the mailbox until Ctrl-C
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, local) |
//! | [`generation`] | Text-generation providers (OpenAI, Ollama) |
//! | [`knowledge_base`] | Knowledge-base JSON I/O |
//! | [`sqlite_store`] | SQLite persistence for the retrieval index |
//! | [`mailbox`] | IMAP fetch / SMTP send |
//! | [`session`] | The mailbox session loop |
//!
//! Domain logic (normalizer, classifier, index, composer) lives in the
//! `replydesk-core` crate.

pub mod check_cmd;
pub mod config;
pub mod db;
pub mod embedding;
pub mod generation;
pub mod index_cmd;
pub mod knowledge_base;
pub mod mailbox;
pub mod migrate;
pub mod prepare_cmd;
pub mod run_cmd;
pub mod search;
pub mod session;
pub mod sqlite_store;
