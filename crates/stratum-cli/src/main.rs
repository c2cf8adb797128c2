//! stratum command line interface
//!
//! One subcommand per migration workflow operation, configured by a
//! `stratum.toml` in the working directory (or `--config`). Errors map to a
//! non-zero exit code with a human-readable message.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::bail;
use clap::{Parser, Subcommand};
use stratum::{App, Revision, RevisionOptions, RevisionRef, Stratum};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "stratum")]
#[command(about = "Database schema migrations")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "stratum.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration directory and template if they do not exist
    Mkdir,

    /// Show the list of current revisions
    Current {
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the list of revisions that have no child revisions
    Heads {
        /// Treat dependencies as down revisions
        #[arg(long)]
        resolve_dependencies: bool,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the list of revisions that have more than one next revision
    Branches {
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the list of revisions in the order they will run
    Log {
        /// Show since this revision
        #[arg(long, default_value = "base")]
        start: String,

        /// Show until this revision
        #[arg(long, default_value = "heads")]
        end: String,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the given revisions
    Show { revisions: Vec<String> },

    /// Set the current revision without running migrations
    Stamp {
        #[arg(default_value = "heads")]
        target: String,
    },

    /// Run migrations to upgrade the database
    Upgrade {
        #[arg(default_value = "heads")]
        target: String,
    },

    /// Run migrations to downgrade the database
    Downgrade {
        #[arg(default_value = "-1", allow_hyphen_values = true)]
        target: String,
    },

    /// Generate a new revision
    Revision {
        message: String,

        /// Create an empty script without autogenerated operations
        #[arg(long)]
        empty: bool,

        /// Use this independent branch name
        #[arg(short, long, default_value = "default")]
        branch: String,

        /// Parent revision(s) of this revision
        #[arg(short, long, default_values_t = vec!["head".to_string()])]
        parent: Vec<String>,

        /// Allow a non-head parent revision
        #[arg(long)]
        splice: bool,

        /// Revision(s) this revision depends on
        #[arg(short, long)]
        depend: Vec<String>,

        /// Label(s) to apply to the revision
        #[arg(short, long)]
        label: Vec<String>,

        /// Where to store the revision
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Generate a merge revision
    Merge {
        revisions: Vec<String>,

        #[arg(short, long)]
        message: Option<String>,

        /// Label(s) to apply to the revision
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// Fail if the database is not up to date with the model metadata
    Check,
}

#[tokio::main]
async fn main() {
    stratum::init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let (stratum, app) = CliConfig::load(&cli.config)?.build()?;

    stratum.init_app(&app).await?;

    let ctx = app.context();
    let result = dispatch(cli.command, &stratum, &app).await;
    ctx.close(None).await;
    result
}

async fn dispatch(command: Commands, stratum: &Stratum, app: &App) -> anyhow::Result<()> {
    match command {
        Commands::Mkdir => {
            stratum.mkdir(app).await?;
        }
        Commands::Current { verbose } => {
            for rev in stratum.current(app).await? {
                println!("{}", rev.cmd_format(verbose));
            }
        }
        Commands::Heads {
            resolve_dependencies,
            verbose,
        } => {
            for rev in stratum.heads(app, resolve_dependencies).await? {
                println!("{}", rev.cmd_format(verbose));
            }
        }
        Commands::Branches { verbose } => {
            let script = stratum.script_directory(app).await?;

            for rev in stratum.branches(app).await? {
                println!("{}", rev.cmd_format(verbose));

                for next in rev.nextrev() {
                    let child = script.get_revision(next)?;
                    println!("    -> {}", child.cmd_format(false));
                }
            }
        }
        Commands::Log {
            start,
            end,
            verbose,
        } => {
            for rev in stratum.log(app, start.as_str(), end.as_str()).await? {
                println!("{}", rev.cmd_format(verbose));
            }
        }
        Commands::Show { revisions } => {
            let script = stratum.script_directory(app).await?;

            for rev in script.get_revisions(&revisions)? {
                println!("{}", rev.cmd_format(true));
            }
        }
        Commands::Stamp { target } => {
            stratum.stamp(app, target.as_str()).await?;
        }
        Commands::Upgrade { target } => {
            stratum.upgrade(app, target.as_str()).await?;
        }
        Commands::Downgrade { target } => {
            // Positive targets are made negative by the extension's policy;
            // both spellings work from the shell.
            stratum.downgrade(app, target.as_str()).await?;
        }
        Commands::Revision {
            message,
            empty,
            branch,
            parent,
            splice,
            depend,
            label,
            path,
        } => {
            let mut options = RevisionOptions::new(message)
                .empty(empty)
                .branch(branch)
                .splice(splice)
                .parent(RevisionRef::Many(parent));

            if !depend.is_empty() {
                options = options.depend(RevisionRef::Many(depend));
            }

            for label in label {
                options = options.label(label);
            }

            if let Some(path) = path {
                options = options.path(path);
            }

            for rev in stratum.revision(app, options).await? {
                print_generated(&rev);
            }
        }
        Commands::Merge {
            revisions,
            message,
            label,
        } => {
            let reference = if revisions.is_empty() {
                RevisionRef::Single("heads".to_string())
            } else {
                RevisionRef::Many(revisions)
            };

            let rev = stratum.merge(app, reference, message, label).await?;
            print_generated(&rev);
        }
        Commands::Check => {
            let script = stratum.produce_migrations(app).await?;

            if script.is_empty() {
                println!("No new upgrade operations detected.");
            } else {
                for db in script.databases() {
                    for op in &db.ops {
                        println!("{}: {}", db.name, op.describe());
                    }
                }

                bail!("new upgrade operations detected; generate a revision");
            }
        }
    }

    Ok(())
}

fn print_generated(rev: &Arc<Revision>) {
    println!("Generated {}", rev.path.display());
}
