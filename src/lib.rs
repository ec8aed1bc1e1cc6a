//! Posts media from a watched folder to a Telegram channel at randomized intervals.

pub mod backend;
pub mod caption;
pub mod config;
pub mod delivery;
pub mod error;
pub mod events;
pub mod filter;
pub mod media;
pub mod scanner;
pub mod scheduler;
pub mod storage;
pub mod telegram;
pub mod worker;

#[cfg(test)]
mod testing;
