//! stratflow compiles visually built strategy graphs into canonical
//! `IF ... THEN BUY|SELL` rule text and packages it, together with OHLCV
//! candles, into the request body a backtest engine expects.
//!
//! The domain layer (graph model, validator, compiler, rule text) has no I/O.
//! Ports describe what the domain needs from the outside world; adapters
//! implement them over INI, CSV and JSON files.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
