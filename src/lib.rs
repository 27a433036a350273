pub mod config;
pub mod console;
pub mod effects;
pub mod engine;
pub mod error;
pub mod events;
pub mod lyrics;
pub mod models;
pub mod player;
pub mod ports;
pub mod queue;
pub mod storage;
pub mod tunehub;
