//! # feed_archiver
//!
//! Library half of the archiver: everything except argument parsing and the
//! composition root in `main`.
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | YAML configuration and site definitions |
//! | [`crawler`] | Per-feed orchestration, export and purge |
//! | [`dedup`] | Filter and already-archived gate |
//! | [`discovery`] | Candidate links from index pages |
//! | [`error`] | Typed errors per component |
//! | [`extract`] | Metadata and article-body extraction strategies |
//! | [`fetcher`] | HTTP fetching with retry and headless-browser escalation |
//! | [`models`] | Shared data types |
//! | [`normalizer`] | URL repair, resolution and host rules |
//! | [`outputs`] | Export templates and RSS |
//! | [`postprocess`] | Link rewriting, video lifting, cover-image removal |
//! | [`store`] | Archive and export-table storage |
//! | [`utils`] | Small helpers |

pub mod config;
pub mod crawler;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod outputs;
pub mod postprocess;
pub mod store;
pub mod utils;
