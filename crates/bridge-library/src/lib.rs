//! # Bridge Library
//!
//! The data side of speaker-bridge: what a host's card/playlist library
//! looks like, how it is fetched, and how free-text questions about it are
//! answered.
//!
//! ## Overview
//!
//! - **Model**: [`LibraryPayload`] with tolerant parsing of partial backends
//! - **Fetching**: the [`LibraryFetcher`] contract and its [`FetchError`] taxonomy
//! - **Queries**: [`QueryDispatcher`], an ordered rule table mapping a query to a [`QueryIntent`]
//!
//! ## Usage
//!
//! ```rust
//! use bridge_library::{search_library, LibraryPayload};
//! use serde_json::json;
//!
//! let payload = LibraryPayload::parse(&json!({
//!     "cards": [{"id": "1", "title": "Bedtime Stories"}],
//!     "playlists": []
//! }))
//! .unwrap();
//!
//! let answer = search_library(&payload, "how many cards are there?");
//! assert!(answer.contains('1'));
//! ```
//!
//! ## Rule Order
//!
//! Query rules overlap ("list the authors in my cards" mentions both authors
//! and cards), so the order of [`QueryDispatcher::standard_rules`] is part of
//! the contract: the first matching rule answers.

pub mod fetch;
pub mod model;
pub mod query;

pub use fetch::{FetchError, FetchResult, LibraryFetcher};
pub use model::{Card, LibraryPayload, MalformedPayload, Playlist};
pub use query::{search_library, Query, QueryDispatcher, QueryIntent, QueryRule};
