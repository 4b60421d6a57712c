//! Command-line argument parsing for the simbox client
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Parser, Subcommand};
use simbox_core::AppConfig;
use std::path::PathBuf;

/// simbox - work in a remote sandbox as if it were local
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to the XDG config location)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Remote API base URL, overriding the config file
    #[arg(long, env = "SIMBOX_API_BASE")]
    pub api_base: Option<String>,

    /// Storage namespace, overriding the config file
    #[arg(long, env = "SIMBOX_NAMESPACE")]
    pub namespace: Option<String>,

    /// Verbose logging to stderr
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },

    /// Print a file
    Cat { path: String },

    /// Write a file from an argument or stdin
    Write {
        path: String,
        /// Content to write; read from stdin when omitted
        content: Option<String>,
    },

    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parent directories
        #[arg(long, short = 'p', default_value_t = false)]
        parents: bool,
    },

    /// Load a remote subtree into the cache and list what was fetched
    Hydrate {
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Run a command remotely and print its output
    Exec {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Start a command remotely without waiting for it
    Spawn {
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Attach an interactive remote shell (Ctrl-] detaches)
    Shell,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Apply flag and environment overrides on top of loaded config
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(base) = &self.api_base {
            config.remote.api_base_url = base.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.remote.namespace = namespace.clone();
        }
    }

    /// Whether the command takes over the terminal
    pub fn is_interactive(&self) -> bool {
        self.command == Command::Shell
    }
}
