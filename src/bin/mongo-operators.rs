use bson::Document;
use clap::{Args, Parser, Subcommand};
use mongo_operators::config::load_config;
use mongo_operators::params::parse_select;
use mongo_operators::{FindQuery, MemoryCollection, QueryMapError, QueryParams, Translator, TranslatorConfig, logger};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mongo-operators", version, about = "Translate query-string filters into document queries")]
struct Cli {
    /// Translator config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Write rolling log files into this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// error|warn|info|debug|trace
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// log4rs config file (YAML/TOML/JSON); takes over from the other log flags
    #[arg(long, global = true)]
    log_config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct QueryInput {
    /// URL query string, e.g. `name_contains=lore&limit=2&sort=age:desc`
    #[arg(long, conflicts_with = "json", required_unless_present = "json")]
    query: Option<String>,
    /// Query specification as a JSON object
    #[arg(long)]
    json: Option<String>,
    /// Projection document as JSON, e.g. `{"age":1}`
    #[arg(long)]
    projection: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved filter, projection and cursor options
    Translate {
        #[command(flatten)]
        input: QueryInput,
    },
    /// Load documents and run the translated query against them
    Run {
        /// JSON array or NDJSON file with the documents
        #[arg(long)]
        data: PathBuf,
        /// Comma separated list of text-indexed fields
        #[arg(long)]
        text_index: Option<String>,
        /// Select string applied after translation, e.g. `age -name`
        #[arg(long)]
        select: Option<String>,
        #[command(flatten)]
        input: QueryInput,
    },
}

fn read_params(input: &QueryInput, cfg: &TranslatorConfig) -> Result<(QueryParams, Option<Document>), QueryMapError> {
    let params = match (&input.query, &input.json) {
        (Some(qs), _) => QueryParams::from_query_string_with(qs, cfg),
        (None, Some(json)) => QueryParams::from_json_str(json)?,
        (None, None) => QueryParams::new(),
    };
    let projection = match &input.projection {
        Some(p) => Some(QueryParams::from_json_str(p)?.0),
        None => None,
    };
    Ok((params, projection))
}

fn run(cli: Cli) -> Result<(), QueryMapError> {
    let cfg = load_config(cli.config.as_deref())?;
    let translator = Translator::new(cfg);
    match cli.command {
        Command::Translate { input } => {
            let (params, projection) = read_params(&input, translator.config())?;
            let resolved = translator.translate(&params, projection);
            println!("{}", serde_json::to_string_pretty(&resolved.to_json())?);
        }
        Command::Run { data, text_index, select, input } => {
            let (params, projection) = read_params(&input, translator.config())?;
            let collection = MemoryCollection::new(
                data.file_stem().and_then(|s| s.to_str()).unwrap_or("data").to_string(),
            );
            if let Some(fields) = text_index {
                collection.create_text_index(fields.split(',').map(str::trim));
            }
            let loaded = collection.import_json(std::fs::File::open(&data)?)?;
            log::info!("loaded {loaded} documents from {}", data.display());
            let mut query = translator.translate(&params, projection).apply(&collection);
            if let Some(sel) = select {
                query = query.select(parse_select(&sel));
            }
            for doc in query.exec()? {
                let line = serde_json::to_string(&bson::Bson::Document(doc).into_relaxed_extjson())?;
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Some(path) = &cli.log_config {
        if let Err(e) = logger::init_path(path) {
            eprintln!("error: cannot load log config {}: {e}", path.display());
            std::process::exit(1);
        }
    } else if cli.log_dir.is_none() && cli.log_level.is_none() && std::env::var_os("MONGO_OPERATORS_LOG_LEVEL").is_some() {
        logger::configure_from_env();
    } else {
        logger::configure_logging(cli.log_dir.as_deref(), cli.log_level.as_deref().or(Some("warn")), None);
    }
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
