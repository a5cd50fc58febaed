//! Blog Feed Reader - a small installable feed reader
//!
//! Takes a list of blog URLs, fetches their posts through an RSS-to-JSON
//! conversion API and renders the newest few of each as cards.

pub mod config;
pub mod db;
pub mod fetcher;
pub mod loader;
pub mod pwa;
pub mod render;
pub mod routes;
pub mod source;
