pub mod api;
pub mod catalog;
pub mod category;
pub mod cli;
pub mod config;
pub mod error;
pub mod finding;
pub mod handler;
pub mod merge;
pub mod process;
pub mod prompts;
pub mod rewriter;
pub mod runner;
pub mod test_helpers;
pub mod validation;
