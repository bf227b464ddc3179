//! stemsplice command line front end
//!
//! Loads the configuration and a JSON project, runs a separation through
//! `stemsplice_core` and writes the edited project back.

pub mod cli;
pub mod commands;
pub mod project;
