//! Tessera Catalog CLI
//!
//! Command-line interface for building and inspecting a tessera catalog.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use tessera_catalog_core::{
    CreateTableProfile, DatabaseService, Include, SqlQuery, Table, TableData, TableJoins, User,
};
use tessera_catalog_storage::{backend_from_uri, parse_catalog_uri, CatalogLocation};
use tessera_catalog_tables::{Fields, RepositoryConfig, TableRepository};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tessera")]
#[command(version, about = "Tessera catalog CLI", long_about = None)]
struct Cli {
    /// Path or file:// URI of the catalog database
    #[arg(
        short,
        long,
        env = "TESSERA_CATALOG_PATH",
        default_value = "tessera_catalog.db",
        global = true
    )]
    catalog: String,

    /// Actor recorded as the author of changes
    #[arg(short = 'u', long, global = true)]
    updated_by: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new catalog
    Init {
        /// Overwrite existing catalog if it exists
        #[arg(short, long)]
        force: bool,
    },

    /// Register services, databases, schemas, users, tags and locations
    #[command(subcommand)]
    Register(Register),

    /// Create a table from a JSON request
    CreateTable {
        /// JSON file holding the table request
        file: PathBuf,
    },

    /// Create or fully replace a table from a JSON request
    Put {
        file: PathBuf,
    },

    /// Apply a JSON merge patch to a table
    Patch {
        id: Uuid,
        /// JSON file holding the merge patch
        file: PathBuf,
    },

    /// Show a table by fully qualified name
    Show {
        fqn: String,

        /// Comma separated fields to populate, e.g. "owner,tags,joins"
        #[arg(short, long, default_value = "")]
        fields: String,

        /// Also show a soft-deleted table
        #[arg(long)]
        include_deleted: bool,
    },

    /// List tables
    List {
        #[arg(short, long, default_value = "")]
        fields: String,

        #[arg(long)]
        include_deleted: bool,
    },

    /// Soft delete a table
    Delete {
        id: Uuid,
    },

    /// Join statistics
    #[command(subcommand)]
    Joins(JoinsCommand),

    /// Replace the sample data of a table from a JSON file
    Sample {
        id: Uuid,
        file: PathBuf,
    },

    /// Queries seen against a table
    #[command(subcommand)]
    Query(QueryCommand),

    /// Table and column profiles
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Show the version history of a table
    Versions {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum Register {
    /// Register a database service
    Service {
        name: String,
        /// Service type, e.g. Postgres or Snowflake
        #[arg(short = 't', long)]
        service_type: String,
    },
    /// Register a database under a service
    Database {
        name: String,
        #[arg(long)]
        service: Uuid,
    },
    /// Register a schema under a database
    Schema {
        name: String,
        #[arg(long)]
        database: Uuid,
    },
    /// Register a user
    User {
        name: String,
        #[arg(long)]
        display_name: Option<String>,
        /// Mark the user as an automated actor
        #[arg(long)]
        bot: bool,
    },
    /// Define a tag
    Tag {
        fqn: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Tags applied along with this one
        #[arg(long, value_delimiter = ',')]
        associated: Vec<String>,
    },
    /// Register a storage location under a service
    Location {
        name: String,
        #[arg(long)]
        service: Uuid,
        #[arg(long)]
        path: Option<String>,
    },
}

#[derive(Subcommand)]
enum JoinsCommand {
    /// Record join observations from a JSON file
    Add { id: Uuid, file: PathBuf },
}

#[derive(Subcommand)]
enum QueryCommand {
    /// Add a query
    Add(QueryArgs),
}

#[derive(Args)]
struct QueryArgs {
    id: Uuid,
    /// SQL text
    query: String,
    #[arg(long)]
    vote: Option<f64>,
    /// Users who ran the query, by name
    #[arg(long, value_delimiter = ',')]
    users: Vec<String>,
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Store a table profile (with column profiles) from a JSON file
    Add { id: Uuid, file: PathBuf },
    /// List table profiles between two timestamps (inclusive)
    List {
        fqn: String,
        #[arg(long, default_value_t = 0)]
        start: i64,
        #[arg(long, default_value_t = i64::MAX)]
        end: i64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let updated_by = cli.updated_by.as_deref();

    let result = match cli.command {
        Commands::Init { force } => init_catalog(&cli.catalog, force),
        Commands::Register(register) => run_register(&cli.catalog, register, updated_by),
        Commands::CreateTable { file } => create_table(&cli.catalog, &file, updated_by),
        Commands::Put { file } => put_table(&cli.catalog, &file, updated_by),
        Commands::Patch { id, file } => patch_table(&cli.catalog, id, &file, updated_by),
        Commands::Show {
            fqn,
            fields,
            include_deleted,
        } => show_table(&cli.catalog, &fqn, &fields, include_deleted),
        Commands::List {
            fields,
            include_deleted,
        } => list_tables(&cli.catalog, &fields, include_deleted),
        Commands::Delete { id } => delete_table(&cli.catalog, id, updated_by),
        Commands::Joins(JoinsCommand::Add { id, file }) => add_joins(&cli.catalog, id, &file),
        Commands::Sample { id, file } => add_sample_data(&cli.catalog, id, &file),
        Commands::Query(QueryCommand::Add(args)) => add_query(&cli.catalog, args),
        Commands::Profile(ProfileCommand::Add { id, file }) => add_profile(&cli.catalog, id, &file),
        Commands::Profile(ProfileCommand::List { fqn, start, end }) => {
            list_profiles(&cli.catalog, &fqn, start, end)
        }
        Commands::Versions { id } => show_versions(&cli.catalog, id),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn open_repository(catalog: &str) -> Result<TableRepository, Box<dyn std::error::Error>> {
    let backend = backend_from_uri(catalog)?;
    let config = RepositoryConfig::from_env()?;
    Ok(TableRepository::open(backend.as_ref(), config)?)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read '{}': {}", path.display(), e))?;
    serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e).into())
}

fn include(include_deleted: bool) -> Include {
    if include_deleted {
        Include::All
    } else {
        Include::NonDeleted
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_catalog(catalog: &str, force: bool) -> CliResult {
    let CatalogLocation::Local(path) = parse_catalog_uri(catalog)?;
    let backend = backend_from_uri(catalog)?;

    if backend.exists()? {
        if !force {
            return Err(format!(
                "Catalog already exists at '{}'. Use --force to overwrite.",
                path.display()
            )
            .into());
        }
        println!("Removing existing catalog at '{}'", path.display());
        std::fs::remove_file(&path)?;
    }

    backend.initialize()?;
    println!("Initialized catalog at '{}'", path.display());
    Ok(())
}

fn run_register(catalog: &str, register: Register, updated_by: Option<&str>) -> CliResult {
    let mut repo = open_repository(catalog)?;

    match register {
        Register::Service { name, service_type } => {
            let service = repo.register_service(DatabaseService::new(name, service_type), updated_by)?;
            println!("{} {}", service.id, service.fully_qualified_name);
        }
        Register::Database { name, service } => {
            let database = repo.register_database(&name, service, updated_by)?;
            println!("{} {}", database.id, database.fully_qualified_name);
        }
        Register::Schema { name, database } => {
            let schema = repo.register_schema(&name, database, updated_by)?;
            println!("{} {}", schema.id, schema.fully_qualified_name);
        }
        Register::User {
            name,
            display_name,
            bot,
        } => {
            let mut user = User::new(name);
            user.display_name = display_name;
            user.is_bot = bot;
            let user = repo.register_user(user, updated_by)?;
            println!("{} {}", user.id, user.name);
        }
        Register::Tag {
            fqn,
            description,
            associated,
        } => {
            let associated: Vec<&str> = associated.iter().map(String::as_str).collect();
            let tag = repo.create_tag(&fqn, description.as_deref(), &associated)?;
            println!("{}", tag.fqn);
        }
        Register::Location {
            name,
            service,
            path,
        } => {
            let location = repo.register_location(&name, path.as_deref(), service, updated_by)?;
            println!("{} {}", location.id, location.fully_qualified_name);
        }
    }
    Ok(())
}

fn create_table(catalog: &str, file: &Path, updated_by: Option<&str>) -> CliResult {
    let request: Table = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    print_json(&repo.create_table(request, updated_by)?)
}

fn put_table(catalog: &str, file: &Path, updated_by: Option<&str>) -> CliResult {
    let request: Table = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    print_json(&repo.create_or_update(request, updated_by)?)
}

fn patch_table(catalog: &str, id: Uuid, file: &Path, updated_by: Option<&str>) -> CliResult {
    let patch: serde_json::Value = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    print_json(&repo.patch(id, &patch, updated_by)?)
}

fn show_table(catalog: &str, fqn: &str, fields: &str, include_deleted: bool) -> CliResult {
    let fields = Fields::parse(fields)?;
    let repo = open_repository(catalog)?;
    print_json(&repo.get_by_name(fqn, &fields, include(include_deleted))?)
}

fn list_tables(catalog: &str, fields: &str, include_deleted: bool) -> CliResult {
    let fields = Fields::parse(fields)?;
    let repo = open_repository(catalog)?;
    let tables = repo.list(&fields, include(include_deleted))?;

    if fields == Fields::none() {
        println!("Tables:");
        for table in &tables {
            let marker = if table.deleted { " (deleted)" } else { "" };
            println!("  {} v{}{}", table.fqn(), table.version, marker);
        }
        return Ok(());
    }
    print_json(&tables)
}

fn delete_table(catalog: &str, id: Uuid, updated_by: Option<&str>) -> CliResult {
    let mut repo = open_repository(catalog)?;
    let table = repo.delete(id, updated_by)?;
    println!("Deleted {} (version {})", table.fqn(), table.version);
    Ok(())
}

fn add_joins(catalog: &str, id: Uuid, file: &Path) -> CliResult {
    let joins: TableJoins = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    let table = repo.add_joins(id, &joins)?;
    print_json(&table.joins)
}

fn add_sample_data(catalog: &str, id: Uuid, file: &Path) -> CliResult {
    let data: TableData = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    let table = repo.add_sample_data(id, data)?;
    println!(
        "Stored {} sample rows for {}",
        table.sample_data.as_ref().map(|d| d.rows.len()).unwrap_or_default(),
        table.fqn()
    );
    Ok(())
}

fn add_query(catalog: &str, args: QueryArgs) -> CliResult {
    let mut repo = open_repository(catalog)?;
    let mut query = SqlQuery::new(args.query);
    query.vote = args.vote;
    for name in &args.users {
        let user = repo.get_user(name)?;
        query.users.push(user);
    }

    let table = repo.add_query(args.id, query)?;
    print_json(&table.table_queries)
}

fn add_profile(catalog: &str, id: Uuid, file: &Path) -> CliResult {
    let profile: CreateTableProfile = read_json(file)?;
    let mut repo = open_repository(catalog)?;
    let table = repo.add_table_profile_data(id, profile)?;
    print_json(&table.profile)
}

fn list_profiles(catalog: &str, fqn: &str, start: i64, end: i64) -> CliResult {
    let repo = open_repository(catalog)?;
    print_json(&repo.list_table_profiles(fqn, start, end)?)
}

fn show_versions(catalog: &str, id: Uuid) -> CliResult {
    let repo = open_repository(catalog)?;
    let versions = repo.list_versions(id)?;

    println!("Versions:");
    for table in versions {
        let changed: Vec<&str> = table
            .change_description
            .iter()
            .flat_map(|c| c.field_names())
            .collect();
        print!("  {:.1}  {}  {}", table.version, table.updated_at, table.updated_by);
        if !changed.is_empty() {
            print!("  [{}]", changed.join(", "));
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::io::Write;
    use tessera_catalog_core::{CatalogEntity, Column, ColumnDataType};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_register_tag() {
        let cli = Cli::try_parse_from([
            "tessera",
            "register",
            "tag",
            "Glossary.Revenue",
            "--associated",
            "Tier.Gold,PII.None",
        ])
        .unwrap();
        match cli.command {
            Commands::Register(Register::Tag { fqn, associated, .. }) => {
                assert_eq!(fqn, "Glossary.Revenue");
                assert_eq!(associated, vec!["Tier.Gold", "PII.None"]);
            }
            _ => panic!("expected register tag"),
        }
    }

    #[test]
    fn test_bad_uuid_is_rejected() {
        assert!(Cli::try_parse_from(["tessera", "versions", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_read_json_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = read_json::<serde_json::Value>(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_add_sample_data_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let catalog = temp_dir.path().join("catalog.db");
        let catalog = catalog.to_str().unwrap();
        init_catalog(catalog, false).unwrap();

        let table_id = {
            let mut repo = open_repository(catalog).unwrap();
            let service = repo
                .register_service(DatabaseService::new("svc", "Postgres"), None)
                .unwrap();
            let database = repo.register_database("db", service.id, None).unwrap();
            let schema = repo.register_schema("public", database.id, None).unwrap();
            let request = Table::new("orders", schema.entity_reference())
                .with_columns(vec![Column::new("id", ColumnDataType::Bigint)]);
            repo.create_table(request, None).unwrap().id
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"columns": ["id"], "rows": [[1], [2]]}}"#).unwrap();
        add_sample_data(catalog, table_id, file.path()).unwrap();

        let repo = open_repository(catalog).unwrap();
        let fields = Fields::parse("sampleData").unwrap();
        let table = repo.get(table_id, &fields, Include::NonDeleted).unwrap();
        assert_eq!(table.sample_data.unwrap().rows.len(), 2);
    }
}
