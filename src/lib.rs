//! beatcloud-reorg - reconcile a local DJ music library against the shared
//! playlists and reorganize files by contributing user and genre.

pub mod cache;
pub mod config;
pub mod corrections;
pub mod engine;
pub mod error;
pub mod fsops;
pub mod inventory;
pub mod matcher;
pub mod models;
pub mod normalize;
pub mod planner;
pub mod pool;
pub mod progress;
pub mod safety;
pub mod scoring;
pub mod spotify;
pub mod store;
