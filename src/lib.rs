//! # incident-rag
//!
//! Retrieval over historical support incidents plus LLM tool dispatch.
//!
//! Ticket exports are ingested into SQLite with one embedding per incident
//! aspect (description, resolution, combined). Similar past incidents are
//! found by cosine similarity, and a chat model can call tools such as
//! "incidents created in the last N days".
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌────────────┐
//! │ CSV / JSON  │──▶│  Ingestor    │──▶│  SQLite     │
//! │ ticket rows │   │ dedup+embed  │   │ incidents + │
//! └─────────────┘   └──────────────┘   │ embeddings  │
//!                                      └─────┬──────┘
//!                  ┌─────────────────────────┤
//!                  ▼                         ▼
//!           ┌────────────┐           ┌──────────────┐
//!           │  search    │           │  Dispatcher  │
//!           │  + report  │           │ chat → tools │
//!           └────────────┘           └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! irag init                          # create database
//! irag ingest ./exports/bugs.csv     # load tickets
//! irag search "printer offline after update"
//! irag incidents "2 weeks"
//! irag ask "how many incidents were opened this month?"
//! irag serve                         # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`store`] | Record store trait, SQLite and in-memory backends |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`ingest`] | Row ingestion pipeline |
//! | [`search`] | Similarity search and report |
//! | [`normalize`] | Free-text time periods to days |
//! | [`summary`] | Incidents created in a window |
//! | [`tools`] | Tool trait, registry, typed invocations |
//! | [`chat`] | Chat-with-tools backends |
//! | [`dispatch`] | Single-pass tool dispatch |
//! | [`stats`] | Store statistics |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod embedding;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod summary;
pub mod tools;
