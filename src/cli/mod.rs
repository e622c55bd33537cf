//! CLI module - Command-line interface for Wardkeep
//!
//! This module provides a structured CLI using clap for argument parsing.

use clap::{Parser, Subcommand};

/// Wardkeep - session authentication and role authorization service
#[derive(Parser)]
#[command(name = "wardkeep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    #[command(alias = "-d", alias = "--daemon")]
    Daemon,

    /// Create a default config file
    Init,

    /// Prune stale login attempts and expired autologin tokens
    Purge,

    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create a user. The password is read from WARDKEEP_PASSWORD, or
    /// generated and printed.
    Add {
        username: String,
        email: String,
        /// Role to assign (seeded roles: 1 = Administrator, 2 = Editor,
        /// 3 = User)
        #[arg(default_value_t = 3)]
        role_id: i32,
    },
}
