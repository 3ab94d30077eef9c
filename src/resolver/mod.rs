//! Resolver layer - maps a candidate to zero-or-one external identifier
//!
//! This module provides:
//! - Resolver trait for lookup-service abstraction
//! - WikidataResolver implementation over the Wikidata search API
//! - RelevanceStrategy for choosing among search hits
//! - MockResolver with scripted outcomes for tests and dry runs

pub mod client;
pub mod relevance;
pub mod wikidata;

pub use client::{MockResolver, Resolver};
pub use relevance::{AcceptFirst, DescriptionKeywords, RelevanceStrategy, SearchHit};
pub use wikidata::{ENTITY_URI_PREFIX, WikidataConfig, WikidataResolver, clean_name};
