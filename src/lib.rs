pub mod api;
pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod resolver;
pub mod session;
pub mod store;
pub mod wizard;

#[cfg(test)]
mod test;
