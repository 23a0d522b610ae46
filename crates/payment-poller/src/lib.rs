pub mod auth;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gmail_client;
pub mod ledger;
pub mod runner;
pub mod sink;
