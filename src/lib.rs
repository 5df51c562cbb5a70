pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod lookup;
pub mod output;
pub mod registry;
pub mod retrieval;
pub mod tabular;
