use std::{
    fs,
    io::{self, IsTerminal, Read},
    path::PathBuf,
};

use clap::{Parser as ClapParser, Subcommand};
use plume_query::cli::{
    self, CheckOptions, CheckResult, CliError, NormalizeOptions, SelectOptions,
};
use plume_query::serialization::{ExpandPaths, SerializerOptions};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "plume")]
#[command(about = "Plume - typed OData-style filters and a delta-aware JSON wire format")]
#[command(version)]
struct Cli {
    /// Schema document ({"types": [...], "enums": [...]})
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a filter and print the typed predicate, or apply it to input
    Check {
        /// The filter, e.g. "hat.hattype eq 'whatever'"
        filter: String,

        /// Type the filter applies to
        #[arg(short, long)]
        root: String,

        /// JSON file holding an array of root items to filter
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Parse a select list and print the projection
    Select {
        /// The select list, e.g. "name, hat.hattype as hat"
        list: String,

        #[arg(short, long)]
        root: String,

        /// Project into an anonymous record rather than a dictionary
        #[arg(long)]
        anonymous: bool,
    },

    /// Re-serialize a JSON document according to the schema
    Normalize {
        /// JSON file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(short, long)]
        root: Option<String>,

        /// Comma separated property paths to expand, e.g. "hat,weapons.model"
        #[arg(short, long, default_value = "")]
        expand: String,

        #[arg(short, long)]
        pretty: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let schema = cli::load_schema(cli.schema.as_deref())?;

    match cli.command {
        Commands::Check {
            filter,
            root,
            input,
            pretty,
        } => {
            let options = CheckOptions {
                filter,
                root: cli::resolve_root(&schema, &root)?,
                input: input.map(fs::read_to_string).transpose()?,
                pretty,
            };
            match cli::execute_check(&schema, &options)? {
                CheckResult::Parsed(tree) => println!("{}", tree),
                CheckResult::Filtered(json) => println!("{}", json),
            }
        }
        Commands::Select {
            list,
            root,
            anonymous,
        } => {
            let options = SelectOptions {
                list,
                root: cli::resolve_root(&schema, &root)?,
                anonymous,
            };
            println!("{}", cli::execute_select(&schema, &options)?);
        }
        Commands::Normalize {
            input,
            root,
            expand,
            pretty,
        } => {
            let options = NormalizeOptions {
                input: read_input(input)?,
                root: root.map(|r| cli::resolve_root(&schema, &r)).transpose()?,
                output: SerializerOptions {
                    pretty,
                    expand: ExpandPaths::parse(&expand),
                },
            };
            println!("{}", cli::execute_normalize(&schema, &options)?);
        }
    }
    Ok(())
}

fn read_input(path: Option<PathBuf>) -> Result<String, CliError> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None if !io::stdin().is_terminal() => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
        None => Err(CliError::NoInput),
    }
}
