use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use odataql::odataql_core::{MetadataProvider, MetadataRegistry, QueryParser};
use odataql::{
    compile_select, BatchProcessor, DialectKind, EntityService, RequestContext, ServiceConfig,
    SqliteConnection,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "odataql")]
#[command(about = "OData query options to SQL, with expansion and batch changesets", long_about = None)]
struct Args {
    /// Service configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SQL and parameters for a query string
    Compile {
        /// Entity metadata (JSON)
        #[arg(long)]
        metadata: PathBuf,

        /// Entity set name
        #[arg(long)]
        entity: String,

        /// Query string, e.g. "$filter=Price gt 5&$top=10"
        #[arg(long, default_value = "")]
        query: String,

        /// sqlite, postgres or mssql (overrides the configuration)
        #[arg(long)]
        dialect: Option<DialectKind>,
    },

    /// Run a query against a SQLite database and print the JSON response
    Query {
        #[arg(long)]
        database: PathBuf,

        #[arg(long)]
        metadata: PathBuf,

        #[arg(long)]
        entity: String,

        #[arg(long, default_value = "")]
        query: String,
    },

    /// Run a JSON or multipart batch against a SQLite database
    Batch {
        #[arg(long)]
        database: PathBuf,

        #[arg(long)]
        metadata: PathBuf,

        /// Batch payload file
        #[arg(long)]
        input: PathBuf,

        /// Content type of a multipart payload, including its boundary
        #[arg(long)]
        content_type: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "odataql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ServiceConfig::from_toml_str(&text)?
        }
        None => ServiceConfig::default(),
    };
    let ctx = RequestContext::with_timeout_ms(config.statement_timeout_ms);

    match args.command {
        Command::Compile {
            metadata,
            entity,
            query,
            dialect,
        } => {
            if let Some(dialect) = dialect {
                config.dialect = dialect;
            }
            let registry = load_metadata(&metadata)?;
            let entity = registry.require_entity(&entity)?;
            let options = QueryParser::new(config.parser.clone()).parse_for_entity(&query, entity, &registry)?;
            let compiled = compile_select(&config, &registry, entity, &options)?;

            println!("{}", compiled.sql);
            for (i, param) in compiled.params.iter().enumerate() {
                println!("  {} = {:?}", config.dialect.dialect().placeholder(i + 1), param);
            }
        }
        Command::Query {
            database,
            metadata,
            entity,
            query,
        } => {
            let registry = load_metadata(&metadata)?;
            let conn = SqliteConnection::open(&database)?;
            config.dialect = DialectKind::Sqlite;
            let service = EntityService::new(&conn, &registry, &config);
            let entity = registry.require_entity(&entity)?;
            let response = service.query(entity, &query, &ctx)?;
            println!("{}", serde_json::to_string_pretty(&response.to_json())?);
        }
        Command::Batch {
            database,
            metadata,
            input,
            content_type,
        } => {
            let registry = load_metadata(&metadata)?;
            let conn = SqliteConnection::open(&database)?;
            config.dialect = DialectKind::Sqlite;
            let processor = BatchProcessor::new(&conn, &registry, &config);
            let payload = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;

            match content_type {
                Some(content_type) => {
                    let (content_type, body) =
                        processor.process_multipart(&payload, &content_type, &ctx)?;
                    println!("Content-Type: {}\n", content_type);
                    print!("{}", body);
                }
                None => {
                    let payload: serde_json::Value = serde_json::from_str(&payload)?;
                    let response = processor.process_json(&payload, &ctx)?;
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
        }
    }

    Ok(())
}

fn load_metadata(path: &Path) -> anyhow::Result<MetadataRegistry> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let registry = MetadataRegistry::from_json(&text)
        .with_context(|| format!("parsing metadata in {}", path.display()))?;
    tracing::info!("Loaded metadata for {} entity sets", registry.len());
    Ok(registry)
}
