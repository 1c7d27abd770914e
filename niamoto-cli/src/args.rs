//! Argument parsing (§6): `init`, `import`, `transform`, `export`, `run`, `stats`.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "niamoto", about = "Entity registry and plugin pipeline engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scaffolds a project directory with an empty configuration document.
    Init {
        /// Directory to initialize. Defaults to `PROJECT_HOME`.
        path: Option<String>,
    },
    /// Runs the import phase: datasets, then derived references, then direct references.
    Import {
        #[arg(long, short)]
        config: Option<String>,
    },
    /// Runs every declared transform section.
    Transform {
        #[arg(long, short)]
        config: Option<String>,
    },
    /// Runs every configured export target against the payload store.
    ///
    /// Export reads payloads from the in-memory store populated by this same
    /// invocation's transform pass, so `run` (not a bare `export`) is the
    /// normal way to publish output.
    Export {
        #[arg(long, short)]
        config: Option<String>,
    },
    /// Runs import, transform, and export in sequence.
    Run {
        #[arg(long, short)]
        config: Option<String>,
    },
    /// Prints a read-only report of registered entities, row counts, and the
    /// most recent runs.
    Stats {
        #[arg(long, default_value_t = 5)]
        recent: usize,
    },
}
