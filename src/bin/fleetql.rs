//! FleetQL fixture runner
//!
//! Loads collaborator data from a JSON fixture into the in-memory stores,
//! runs one query and prints the resulting SearchFrame.

use std::path::PathBuf;

use fleetql::storage::{Fixture, InMemoryStores};
use fleetql::{EngineConfig, Query, Role, SearchEngine, TenantId, UserId};

/// Command line options
struct Args {
    /// JSON fixture with aliases, graph, vectors, records and documents
    fixture: PathBuf,
    /// Optional TOML engine configuration
    config: Option<PathBuf>,
    /// Tenant override; defaults to the fixture's tenant
    tenant: Option<String>,
    /// Caller role
    role: Role,
    /// Query text
    query: String,
}

fn usage() -> ! {
    println!("fleetql - run one query against a fixture");
    println!();
    println!("USAGE:");
    println!("    fleetql --fixture <FILE> [OPTIONS] <QUERY>...");
    println!();
    println!("OPTIONS:");
    println!("    -f, --fixture <FILE>      JSON fixture of collaborator data");
    println!("    -c, --config <FILE>       TOML engine configuration");
    println!("    -t, --tenant <ID>         Tenant id [default: fixture tenant or 'default']");
    println!("    -r, --role <ROLE>         Caller role [default: crew]");
    println!("    -h, --help                Print help information");
    std::process::exit(0);
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

fn parse_args() -> Args {
    let mut fixture = None;
    let mut config = None;
    let mut tenant = None;
    let mut role = Role::Crew;
    let mut words: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().unwrap_or_else(|| fail(&format!("{flag} requires a value")));
        match arg.as_str() {
            "--fixture" | "-f" => fixture = Some(PathBuf::from(value("--fixture"))),
            "--config" | "-c" => config = Some(PathBuf::from(value("--config"))),
            "--tenant" | "-t" => tenant = Some(value("--tenant")),
            "--role" | "-r" => {
                let raw = value("--role");
                role = raw.parse().unwrap_or_else(|e: String| fail(&e));
            }
            "--help" | "-h" => usage(),
            flag if flag.starts_with('-') && words.is_empty() => fail(&format!("unknown argument: {flag}")),
            word => words.push(word.to_string()),
        }
    }

    let Some(fixture) = fixture else {
        fail("--fixture is required");
    };
    if words.is_empty() {
        fail("a query is required");
    }
    Args {
        fixture,
        config,
        tenant,
        role,
        query: words.join(" "),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();

    let config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let raw = std::fs::read_to_string(&args.fixture)?;
    let fixture = Fixture::from_json(&raw)?;
    let tenant = args
        .tenant
        .map(TenantId::new)
        .or_else(|| fixture.tenant.clone())
        .unwrap_or_else(|| TenantId::new("default"));

    let stores = InMemoryStores::new();
    stores.load(&fixture, &tenant)?;
    let engine = SearchEngine::in_memory(&stores, config)?;

    let query = Query::new(args.query, UserId::new("cli"), args.role, tenant);
    let frame = engine.search(&query).await?;
    println!("{}", frame.to_json_pretty()?);
    Ok(())
}
