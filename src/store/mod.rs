//! Record store for idlinker.
//!
//! The record store is a JSONL file holding one `Record` per line. It is loaded
//! once at run start, mutated in memory by the aggregator, and written back in
//! full at run end.
//!
//! # Example
//!
//! ```ignore
//! use idlinker::store::RecordStore;
//! use std::path::Path;
//!
//! let mut store = RecordStore::load(Path::new("videogames.jsonl"))?;
//! store.set_external_id("vg:1", "http://www.wikidata.org/entity/Q1")?;
//! store.save(Path::new("videogames_with_wikidata.jsonl"))?;
//! ```

mod record_store;

pub use record_store::RecordStore;
