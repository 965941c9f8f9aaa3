//! Pure domain logic: graph model, validation, compilation and the data
//! shapes exchanged with the engine.

pub mod compiler;
pub mod config_validation;
pub mod document;
pub mod engine_result;
pub mod error;
pub mod graph;
pub mod market_data;
pub mod node;
pub mod payload;
pub mod rule;
pub mod rule_parser;
pub mod validator;
