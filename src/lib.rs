//! Core library for setlist-playlist-sync
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod matching;
pub mod models;
pub mod reconcile;
pub mod server;
pub mod setlist;
pub mod worker;
