//! TSM CLI
//!
//! Command-line front end for the remote resource control layer: lists
//! and toggles services, PM2 apps and git checkouts on a connected machine.

pub mod commands;
pub mod config;
pub mod connect;
pub mod output;
