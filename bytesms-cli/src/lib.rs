//! # bytesms-cli
//!
//! ByteSMS command-line tool. Drives the `bytesms-core` codec from a terminal. A JSON-lines
//! [`mailbox::Mailbox`] stands in for the phone's SMS provider, so whole
//! conversations (send, receive, render, poll) can be exercised without a
//! modem.
//!
//! ## Modules
//!
//! - **config**: TOML configuration and conversion into core types.
//! - **mailbox**: file-backed `TransportGateway` + `MessageStore`.
//! - **commands**: one function per subcommand.

pub mod commands;
pub mod config;
pub mod mailbox;
