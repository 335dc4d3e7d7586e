//! Core library for playlistty: move a playlist from one platform to another.
pub mod api;
pub mod auth;
pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod matcher;
pub mod migrator;
pub mod models;
