mod progress;
mod project;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use db::InstalledSoftwareRepository;
use server::{create_router, state::AppState, ReconcileScheduler};
use toolshed_client::{ClientError, RetryPolicy, ToolshedClient};
use toolshed_core::{InstalledRecord, PackageKind};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use progress::InstallProgressBar;
use project::{Project, ProjectConfig, CONFIG_FILE, TOOLSHED_DIR};

#[derive(Parser)]
#[command(name = "toolshed")]
#[command(about = "Install and track developer tools through Homebrew", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Server port, overriding the project config
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// API token; defaults to the first identity in the project config
    #[arg(long, global = true, env = "TOOLSHED_TOKEN")]
    token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .toolshed/ with a config, a database and an admin token
    Init,
    /// Run the API server
    Serve,
    /// Reconcile your records with what Homebrew reports
    Scan,
    /// Show the project and the recorded installs
    Status,
    /// Install a catalog entry and follow its progress
    Install {
        app_id: String,

        /// Install as a cask instead of the catalog's kind
        #[arg(long, conflicts_with = "formula")]
        cask: bool,

        /// Install as a formula instead of the catalog's kind
        #[arg(long)]
        formula: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project = Project::new(std::env::current_dir()?);

    match cli.command {
        Some(Commands::Init) => init_project(&project).await,
        Some(Commands::Serve) | None => serve(&project, cli.port).await,
        Some(Commands::Scan) => scan(&project, cli.port, cli.token).await,
        Some(Commands::Status) => status(&project).await,
        Some(Commands::Install {
            app_id,
            cask,
            formula,
        }) => {
            let kind = match (cask, formula) {
                (true, _) => Some(PackageKind::Cask),
                (_, true) => Some(PackageKind::Formula),
                _ => None,
            };
            install(&project, cli.port, cli.token, &app_id, kind).await
        }
    }
}

async fn init_project(project: &Project) -> Result<()> {
    if project.is_initialized() {
        println!("Project already initialized at {}", project.dir().display());
        return Ok(());
    }

    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "local".to_string());

    let config = ProjectConfig::bootstrap(&user);
    project.save(&config).await?;

    let pool = db::create_pool(&project.database_url(&config)).await?;
    db::run_migrations(&pool).await?;

    println!();
    println!("Initialized toolshed for '{}'", user);
    println!();
    println!("Created:");
    println!("  {}/", TOOLSHED_DIR);
    println!("  ├── {}", CONFIG_FILE);
    println!("  └── {}", config.server.database);
    println!();
    if let Some(token) = config.default_token() {
        println!("Admin token: {}", token);
        println!();
    }
    println!("Next steps:");
    println!("  1. Run 'toolshed serve' to start the server");
    println!("  2. Run 'toolshed install <app-id>' in another terminal");

    Ok(())
}

async fn serve(project: &Project, port: Option<u16>) -> Result<()> {
    if !project.is_initialized() {
        println!("No {} directory found.", TOOLSHED_DIR);
        println!("Run 'toolshed init' first, or using default configuration.");
        println!();
    }

    let config = project.load().await?;
    let port = port.unwrap_or(config.server.port);

    init_tracing();

    let db_path = project.database_path(&config);
    tracing::info!("Database: {}", db_path.display());
    if config.service.identities.is_empty() {
        tracing::warn!("No identities configured; every request will be rejected");
    }

    let pool = db::create_pool(&project.database_url(&config))
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let state = AppState::from_config(pool, config.service.clone())
        .context("Failed to build application state")?;

    let _scheduler = config
        .service
        .scan_interval()
        .map(|period| ReconcileScheduler::spawn(state.reconciler.clone(), period));

    let catalog_size = state.catalog.len();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;

    println!();
    println!("toolshed");
    println!("════════════════════════════════════════");
    println!();
    println!("  API Server:  http://localhost:{}", port);
    println!("  Swagger UI:  http://localhost:{}/swagger-ui", port);
    println!("  Catalog:     {} entries", catalog_size);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn connect(project: &Project, port: Option<u16>, token: Option<String>) -> Result<ToolshedClient> {
    let config = project.load().await?;
    let token = match token.or_else(|| config.default_token().map(str::to_string)) {
        Some(token) => token,
        None => bail!("No API token: pass --token or run 'toolshed init'"),
    };

    Ok(ToolshedClient::new(config.base_url(port), token))
}

async fn scan(project: &Project, port: Option<u16>, token: Option<String>) -> Result<()> {
    let client = connect(project, port, token).await?;
    let response = client
        .scan()
        .await
        .with_context(|| format!("Scan request to {} failed", client.base_url()))?;

    println!("{}", response.message);
    print_ids("Detected", &response.report.detected);
    print_ids("Removed", &response.report.removed);
    print_ids("Failed", &response.report.failed);

    if !response.success {
        bail!("Scan finished with failed queries");
    }

    Ok(())
}

fn print_ids(label: &str, ids: &[String]) {
    if !ids.is_empty() {
        println!("  {:<9} {}", format!("{}:", label), ids.join(", "));
    }
}

async fn status(project: &Project) -> Result<()> {
    if !project.is_initialized() {
        println!("Not a toolshed project.");
        println!("Run 'toolshed init' to initialize.");
        return Ok(());
    }

    let config = project.load().await?;
    let db_path = project.database_path(&config);

    println!();
    println!("Project: {}", project.dir().display());
    println!("Server:  {}", config.base_url(None));

    if !db_path.exists() {
        println!("Database not initialized.");
        return Ok(());
    }

    let pool = db::create_pool(&project.database_url(&config)).await?;
    let repository = InstalledSoftwareRepository::new(pool);
    let owners = repository.find_owners().await?;

    println!();
    if owners.is_empty() {
        println!("No software recorded yet.");
    }

    for owner in &owners {
        let records = repository.find_by_owner(&owner.owner_id).await?;
        println!("{} <{}> ({}):", owner.name, owner.email, records.len());
        for record in &records {
            print_record(record);
        }
    }

    println!();
    Ok(())
}

fn print_record(record: &InstalledRecord) {
    println!(
        "  ● {:<16} {:<10} {:<8} checked {}",
        record.app_id,
        record.version,
        record.package_kind,
        record.last_checked.format("%Y-%m-%d %H:%M")
    );
}

async fn install(
    project: &Project,
    port: Option<u16>,
    token: Option<String>,
    app_id: &str,
    kind: Option<PackageKind>,
) -> Result<()> {
    let client = connect(project, port, token).await?;

    let kind = match kind {
        Some(kind) => kind,
        None => client
            .list_software()
            .await?
            .into_iter()
            .find(|entry| entry.id == app_id)
            .map(|entry| entry.kind)
            .with_context(|| format!("'{}' is not in the catalog", app_id))?,
    };

    // Open the channel before asking for the install so no event is missed.
    let mut receiver = client
        .progress_stream(RetryPolicy::default())
        .connect()
        .await
        .context("Could not open the progress channel")?;

    let bar = InstallProgressBar::new(app_id);
    let mut finished = false;

    let mut request = {
        let client = client.clone();
        let app_id = app_id.to_string();
        tokio::spawn(async move { client.install(&app_id, kind).await })
    };

    let result = loop {
        tokio::select! {
            result = &mut request => break result,
            event = receiver.next_event(), if !finished => match event {
                Some(Ok(event)) => finished = bar.apply(&event),
                Some(Err(e)) => {
                    tracing::debug!("Progress channel ended: {}", e);
                    finished = true;
                }
                None => finished = true,
            },
        }
    };

    // The terminal event may still be in flight when the response lands.
    while !finished {
        match tokio::time::timeout(Duration::from_secs(2), receiver.next_event()).await {
            Ok(Some(Ok(event))) => finished = bar.apply(&event),
            _ => break,
        }
    }

    let result: Result<InstalledRecord, ClientError> = result.context("Install task failed")?;
    match result {
        Ok(record) => {
            if !finished {
                bar.abandon("Installed");
            }
            println!("Installed {} {}", record.display_name, record.version);
            Ok(())
        }
        Err(e) => {
            if !finished {
                bar.abandon(e.to_string());
            }
            Err(e).with_context(|| format!("Failed to install {}", app_id))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "toolshed=info,server=info,orchestrator=info,tower_http=info".into()
            }),
        )
        .init();
}
