//! oxide-query CLI
//!
//! Inspects the schema of a SQLite database as schema migration sees it.

use clap::{Parser, Subcommand};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_query::TableDescriptor;
use oxide_query_sqlite::catalog::{inspect, list_objects};
use oxide_query_sqlite::{SqliteOptions, SqliteProvider};

/// Schema inspection for oxide-query databases.
#[derive(Parser)]
#[command(name = "oxide-query")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List user tables and views.
    Tables,

    /// Show the introspected schema of one table or view.
    Inspect {
        /// Table or view name.
        table: String,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut options = SqliteOptions::new(&cli.database);
    options.create_if_missing = false;
    debug!(url = %options.url, "Connecting");
    let provider = SqliteProvider::connect(&options).await?;

    match cli.command {
        Commands::Tables => {
            for entry in list_objects(&provider).await? {
                println!("{:<6} {}", entry.kind.as_str(), entry.name);
            }
        }

        Commands::Inspect { table, json } => {
            let Some(descriptor) = inspect(&provider, &table).await? else {
                anyhow::bail!("no table or view named `{table}`");
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&descriptor)?);
            } else {
                print_descriptor(&descriptor);
            }
        }
    }

    Ok(())
}

fn print_descriptor(descriptor: &TableDescriptor) {
    println!("{} {}", descriptor.kind.as_str(), descriptor.name);
    println!("{:-<60}", "");

    if let Some(sql) = &descriptor.view_sql {
        println!("{sql}");
        return;
    }

    for column in &descriptor.columns {
        let mut flags = Vec::new();
        if column.primary_key {
            flags.push("PRIMARY KEY");
        }
        if column.autoincrement {
            flags.push("AUTOINCREMENT");
        }
        if column.not_null {
            flags.push("NOT NULL");
        }
        let default = column
            .default
            .as_ref()
            .map(|d| format!(" DEFAULT {d}"))
            .unwrap_or_default();
        println!(" {:<24} {:<16} {}{}", column.name, column.raw_type, flags.join(" "), default);
    }

    for unique in &descriptor.uniques {
        println!(" UNIQUE ({})", unique.columns.join(", "));
    }
    for index in &descriptor.indices {
        let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
        println!(" {kind} {} ({})", index.name, index.columns.join(", "));
    }
}
