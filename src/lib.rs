//! # Parcel Notes
//!
//! A small local backend for working with land parcels by cadastral number.
//!
//! It persists free-text notes and listing links per parcel, relays searches
//! to the cadastral map service, drafts listing copy through YandexGPT, and
//! serves the static front-end that ties these together.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────┐
//!   HTTP ────────▶│        server            │
//!                 │  routing · CORS · errors │
//!                 └──┬──────┬──────┬──────┬──┘
//!                    ▼      ▼      ▼      ▼
//!               ┌──────┐ ┌─────┐ ┌─────┐ ┌──────┐
//!               │notes │ │ map │ │ llm │ │assets│
//!               │ JSON │ │proxy│ │  ▲  │ │public│
//!               └──────┘ └─────┘ └──┼──┘ └──────┘
//!                                   │
//!                               ┌───┴───┐
//!                               │prompt │
//!                               └───────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! parcel-notes init                  # create data/notes.json
//! parcel-notes serve                 # start the HTTP server on 0.0.0.0:8080
//! parcel-notes notes list            # dump stored notes
//! parcel-notes prompt record.json    # preview the AI prompt for a record
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`error`] | Error taxonomy and HTTP status mapping |
//! | [`notes`] | Note store trait, JSON-file and in-memory backends |
//! | [`prompt`] | Prompt construction from a land-parcel record |
//! | [`llm`] | Language-model client (YandexGPT) |
//! | [`map_proxy`] | Cadastral map search pass-through |
//! | [`assets`] | Static file resolution with traversal protection |
//! | [`server`] | HTTP router and server |

pub mod assets;
pub mod config;
pub mod error;
pub mod llm;
pub mod map_proxy;
pub mod notes;
pub mod prompt;
pub mod server;
