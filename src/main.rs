#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_precision_loss,
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use csvdock::api::{ApiClient, FileInfo};
use csvdock::channels::RealtimeChannel;
use csvdock::config::Config;
use csvdock::credentials::{CredentialStore, FileCredentialStore};
use csvdock::gateway::{Gateway, NoRefresh};
use csvdock::routes::{self, NavTarget, Navigator, RouteDecision, RouteRequirement};
use csvdock::session::{SessionManager, SessionStatus, SessionStore};
use dialoguer::{Input, Password};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};

/// Client for the CSV file manager service.
#[derive(Parser, Debug)]
#[command(name = "csvdock", version, about)]
struct Cli {
    /// Override the configured server URL for this invocation.
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and persist the session
    Login {
        username: Option<String>,
    },
    /// Create an account, then sign in with it
    Signup {
        username: Option<String>,
    },
    /// Drop the persisted session
    Logout,
    /// Show the signed-in identity
    Whoami,
    /// Browse CSV files
    Files {
        #[command(subcommand)]
        command: FilesCommands,
    },
    /// Administrative operations (admin role required)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Follow realtime updates, re-listing files whenever the server
    /// announces a change
    Watch,
}

#[derive(Subcommand, Debug)]
enum FilesCommands {
    /// List available files
    List,
    /// Print a file's parsed content
    Show { id: i64 },
    /// Download the raw CSV
    Download {
        id: i64,
        /// Target path; defaults to the server-side file name
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum AdminCommands {
    /// Upload a CSV file
    Upload { path: PathBuf },
    /// Delete a file
    Rm { id: i64 },
    /// List accounts
    Users,
    /// Delete an account
    RmUser { id: i64 },
}

/// Everything the host shell owns: the session container, the action
/// interface, the typed API surface and the forced-navigation receiver.
struct App {
    config: Config,
    store: Arc<dyn CredentialStore>,
    session: SessionStore,
    manager: SessionManager,
    api: ApiClient,
    nav_rx: mpsc::UnboundedReceiver<NavTarget>,
}

fn build_app(server_override: Option<String>) -> Result<App> {
    let mut config = Config::load_or_init()?;
    if let Some(server) = server_override {
        config.server_url = server;
    }

    let store: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(config.credentials_path()));
    let session = SessionStore::new(SessionManager::initial_session(store.as_ref()));
    let (navigator, nav_rx) = Navigator::new();
    let gateway = Arc::new(Gateway::new(
        config.server_url.clone(),
        store.clone(),
        Arc::new(NoRefresh),
        session.clone(),
        navigator,
    ));
    let api = ApiClient::new(gateway);
    let manager = SessionManager::new(api.clone(), store.clone(), session.clone());

    Ok(App {
        config,
        store,
        session,
        manager,
        api,
        nav_rx,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG; quiet by default so command output stays clean.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("csvdock=warn")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let app = build_app(cli.server)?;

    match cli.command {
        Commands::Login { username } => login(&app.manager, username).await,
        Commands::Signup { username } => signup(&app.manager, username).await,
        Commands::Logout => {
            app.manager.logout();
            println!("Signed out.");
            Ok(())
        }
        Commands::Whoami => whoami(&app.manager, &app.session).await,
        Commands::Files { command } => {
            require(&app, RouteRequirement::Authenticated).await?;
            match command {
                FilesCommands::List => list_files(&app.api).await,
                FilesCommands::Show { id } => show_file(&app.api, id).await,
                FilesCommands::Download { id, output } => {
                    download_file(&app.api, id, output).await
                }
            }
        }
        Commands::Admin { command } => admin(&app, command).await,
        Commands::Watch => watch(app).await,
    }
}

// ── Auth commands ───────────────────────────────────────────────────

fn prompt_username(given: Option<String>) -> Result<String> {
    match given {
        Some(username) => Ok(username),
        None => Ok(Input::new().with_prompt("Username").interact_text()?),
    }
}

async fn login(manager: &SessionManager, username: Option<String>) -> Result<()> {
    let username = prompt_username(username)?;
    let password = Password::new().with_prompt("Password").interact()?;

    let user = manager.login(&username, &password).await?;
    println!(
        "Signed in as {} ({:?}).",
        style(&user.username).bold(),
        user.role
    );
    Ok(())
}

async fn signup(manager: &SessionManager, username: Option<String>) -> Result<()> {
    let username = prompt_username(username)?;
    let password = Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;

    let user = manager.signup(&username, &password).await?;
    println!(
        "Account created; signed in as {}.",
        style(&user.username).bold()
    );
    Ok(())
}

async fn whoami(manager: &SessionManager, session: &SessionStore) -> Result<()> {
    if manager.bootstrap().await != SessionStatus::Authenticated {
        println!("Not signed in.");
        return Ok(());
    }
    if let Some(user) = session.snapshot().user() {
        println!("{} (id {}, {:?})", user.username, user.id, user.role);
    }
    Ok(())
}

// ── Route gating ────────────────────────────────────────────────────

/// Bootstrap the session, then gate on the requirement. `RedirectHome`
/// (signed in but not admin) is reported to the caller so it can land on
/// the non-admin surface instead.
async fn require(app: &App, requirement: RouteRequirement) -> Result<RouteDecision> {
    app.manager.bootstrap().await;
    let decision = routes::evaluate(&app.session.snapshot(), requirement);
    match decision {
        RouteDecision::RedirectLogin => {
            bail!("not signed in; run `csvdock login` first")
        }
        RouteDecision::Render | RouteDecision::RedirectHome | RouteDecision::Pending => {
            Ok(decision)
        }
    }
}

// ── File commands ───────────────────────────────────────────────────

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_files(files: &[FileInfo]) {
    if files.is_empty() {
        println!("No files.");
        return;
    }
    for file in files {
        println!(
            "{:>4}  {:<32}  {:>10}  {}  {}",
            file.id,
            file.name,
            format_size(file.size),
            file.created_at.format("%Y-%m-%d %H:%M"),
            file.uploader_username
        );
    }
}

async fn list_files(api: &ApiClient) -> Result<()> {
    let files = api.files().await?;
    print_files(&files);
    Ok(())
}

async fn show_file(api: &ApiClient, id: i64) -> Result<()> {
    let content = api.file_content(id).await?;
    println!("{}", style(content.headers.join(", ")).bold());
    for row in &content.rows {
        let line: Vec<String> = content
            .headers
            .iter()
            .map(|header| match row.get(header) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(value) => value.to_string(),
                None => String::new(),
            })
            .collect();
        println!("{}", line.join(", "));
    }
    Ok(())
}

async fn download_file(api: &ApiClient, id: i64, output: Option<PathBuf>) -> Result<()> {
    let output = match output {
        Some(path) => path,
        None => {
            let files = api.files().await?;
            let name = files
                .iter()
                .find(|f| f.id == id)
                .map(|f| f.name.clone())
                .unwrap_or_else(|| format!("file-{id}.csv"));
            PathBuf::from(name)
        }
    };

    let bytes = api.download_file(id).await?;
    tokio::fs::write(&output, &bytes)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Saved {} ({}).",
        output.display(),
        format_size(bytes.len() as u64)
    );
    Ok(())
}

// ── Admin commands ──────────────────────────────────────────────────

async fn admin(app: &App, command: AdminCommands) -> Result<()> {
    if require(app, RouteRequirement::AdminOnly).await? == RouteDecision::RedirectHome {
        // Silent downgrade: land on the regular file listing.
        println!("{}", style("Admin access required; showing files.").dim());
        return list_files(&app.api).await;
    }

    match command {
        AdminCommands::Upload { path } => {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .context("upload path has no file name")?
                .to_string();
            if !name.ends_with(".csv") {
                bail!("only CSV files are allowed");
            }
            let content = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read {}", path.display()))?;
            let info = app.api.upload_csv(&name, content).await?;
            println!("Uploaded {} as file {}.", info.name, info.id);
        }
        AdminCommands::Rm { id } => {
            app.api.delete_file(id).await?;
            println!("Deleted file {id}.");
        }
        AdminCommands::Users => {
            for user in app.api.users().await? {
                println!("{:>4}  {:<24}  {:?}", user.id, user.username, user.role);
            }
        }
        AdminCommands::RmUser { id } => {
            app.api.delete_user(id).await?;
            println!("Deleted user {id}.");
        }
    }
    Ok(())
}

// ── Watch ───────────────────────────────────────────────────────────

async fn watch(app: App) -> Result<()> {
    require(&app, RouteRequirement::Authenticated).await?;

    let App {
        config,
        store,
        api,
        mut nav_rx,
        ..
    } = app;

    let channel = Arc::new(RealtimeChannel::from_config(&config, store));
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    channel.subscribe(move |_| {
        let _ = refresh_tx.send(());
    });

    let runner = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.run().await })
    };

    println!("Watching {} (Ctrl-C to stop).", style(config.ws_url()).dim());
    list_files(&api).await?;

    loop {
        tokio::select! {
            Some(()) = refresh_rx.recv() => {
                println!("{}", style("List changed:").dim());
                if let Err(e) = list_files(&api).await {
                    tracing::warn!("refresh failed: {e}");
                }
            }
            Some(target) = nav_rx.recv() => {
                if target == NavTarget::Login {
                    println!("Session expired; run `csvdock login` to continue.");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    channel.shutdown();
    let _ = runner.await;
    Ok(())
}
