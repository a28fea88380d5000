#![allow(clippy::result_large_err)]

pub mod asserter;
pub mod auth;
pub mod cli;
pub mod outputter;
pub mod parser;
pub mod probe;
pub mod runner;
#[cfg(test)]
mod scenarios;
pub mod transport;
pub mod validator;
