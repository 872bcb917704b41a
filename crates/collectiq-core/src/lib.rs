//! Core types, config, errors, collaborator ports and file persistence for
//! the CollectIQ voice agent.

pub mod config;
pub mod error;
pub mod ports;
pub mod records;
pub mod store;
pub mod types;
