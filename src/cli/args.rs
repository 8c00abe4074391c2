//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Suppress informational messages

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// revfs-admin - Administer a versioned filesystem repository
#[derive(Parser, Debug)]
#[command(name = "revfs-admin")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Suppress informational messages; inspection output is unaffected
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new, empty repository
    #[command(
        name = "create",
        long_about = "Create a new, empty repository at REPOS_PATH.\n\n\
            The directory must not exist or must be empty. The new repository \
            holds revision 0: an empty root directory with no properties."
    )]
    Create {
        /// Repository location
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,
    },

    /// Print the youngest revision number
    Youngest {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,
    },

    /// List open transactions with their trees
    #[command(
        name = "lstxns",
        after_help = "\
OUTPUT:
    Txn 3:
    Created: 2024-05-01T10:00:00+00:00
    Author: alice
    Log (0 bytes):

    ==========================================
     a.txt <1.0.3> [5]
     docs/ <2.0.3>
      readme <3.0.3> [0]"
    )]
    Lstxns {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,
    },

    /// List revisions with their trees
    #[command(
        name = "lsrevs",
        long_about = "List revisions with their trees.\n\n\
            With no range every revision is listed. With LOWER only, that one \
            revision is listed. With both, the inclusive range is listed.",
        after_help = "\
WORKFLOW EXAMPLES:
    # Every revision
    revfs-admin lsrevs /srv/repo

    # Just revision 4
    revfs-admin lsrevs /srv/repo 4

    # Revisions 2 through 5
    revfs-admin lsrevs /srv/repo 2 5"
    )]
    Lsrevs {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        /// First revision to list
        lower: Option<String>,

        /// Last revision to list (inclusive)
        upper: Option<String>,
    },

    /// Remove an open transaction
    Rmtxn {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        /// Transaction name, as printed by lstxns
        #[arg(value_name = "TXN_NAME")]
        name: String,
    },

    /// Begin a transaction and print its name
    Createtxn {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        /// Base revision of the new transaction
        #[arg(value_name = "BASE_REV")]
        base: String,
    },

    /// Repair storage after a crash
    #[command(
        name = "recover",
        long_about = "Repair storage after a crash.\n\n\
            Takes the exclusive repository lock, waiting until no other process \
            has the repository open, then replays or discards interrupted \
            writes. Nothing else can open the repository while this runs."
    )]
    Recover {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,
    },

    /// Read or edit revision properties
    Revprop {
        #[command(subcommand)]
        action: RevpropAction,
    },
}

/// Revision property actions.
#[derive(Subcommand, Debug)]
pub enum RevpropAction {
    /// Print a revision property
    Get {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        #[arg(value_name = "REV")]
        rev: String,

        /// Property name
        name: String,
    },

    /// Set a revision property
    Set {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        #[arg(value_name = "REV")]
        rev: String,

        /// Property name
        name: String,

        /// New value
        value: String,
    },

    /// Remove a revision property
    Delete {
        #[arg(value_name = "REPOS_PATH")]
        path: PathBuf,

        #[arg(value_name = "REV")]
        rev: String,

        /// Property name
        name: String,
    },
}
