//! Task Swarm — self-driving task scheduler over a filesystem store.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod events;
pub mod exec;
pub mod http;
pub mod priority;
pub mod problems;
pub mod prompts;
pub mod scenario;
pub mod sink;
pub mod store;
pub mod swarm;
