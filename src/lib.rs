pub mod commands;
pub mod config;
pub mod daemon;
pub mod entities;
pub mod logic;
pub mod metadata;
pub mod smtp_client;
pub mod social;
pub mod templates;
pub mod transport;
