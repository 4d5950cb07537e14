//! `standup` CLI entry-point.
//!
//! Server side:
//! - `serve`   start the API server.
//! - `worker`  deliver queued notifications.
//! - `migrate` run pending database migrations.
//!
//! Client side, against a running server: `login`, `logout`, `whoami`,
//! `draft`, `submit`, `mine`, `dashboard` and `export`.

mod client;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use standup::auth::{HostedAuthClient, RemoteBackend};
use standup::draft::DraftEditor;
use standup::models::{BlockerType, CachedUser};
use standup::storage::{read_json, FileStorage, Storage, USER_CACHE_KEY};
use standup::submission::DEFAULT_MAX_ATTEMPTS;
use standup::{OutboxDispatcher, PgStore, SessionConfig, SessionManager, SessionStatus, Store};

use client::{ApiClient, Submitted};
use config::{AuthArgs, ClientArgs, DatabaseArgs, NotifyArgs, WorkerArgs};

#[derive(Parser)]
#[command(name = "standup", about = "Daily standup updates for teams", version)]
struct Cli {
    #[command(flatten)]
    client: ClientArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the REST API server.
    Serve {
        #[arg(long, env = "STANDUP_BIND", default_value = "0.0.0.0:8080")]
        bind: String,
        /// Delivery attempts per notification before it is dead-lettered.
        #[arg(long, env = "STANDUP_MAX_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: i32,
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        auth: AuthArgs,
        #[command(flatten)]
        notify: NotifyArgs,
    },
    /// Deliver queued notifications until interrupted.
    Worker {
        #[command(flatten)]
        db: DatabaseArgs,
        #[command(flatten)]
        notify: NotifyArgs,
        #[command(flatten)]
        worker: WorkerArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DatabaseArgs,
    },
    /// Sign in with email and password.
    Login {
        email: String,
        #[arg(long, env = "STANDUP_PASSWORD", hide_env_values = true)]
        password: String,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Sign out and clear the local session.
    Logout {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Show the signed-in profile.
    Whoami {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Edit the locally saved update form.
    Draft {
        #[command(subcommand)]
        action: DraftAction,
    },
    /// Submit the saved draft.
    Submit {
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Your own updates, last 30 days by default.
    Mine {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Team updates and stats (managers and admins).
    Dashboard {
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// all, recent or blockers.
        #[arg(long)]
        tab: Option<String>,
        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Download the dashboard rows as CSV.
    Export {
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Defaults to the server-suggested file name in the current directory.
        #[arg(long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        auth: AuthArgs,
    },
}

#[derive(Subcommand)]
enum DraftAction {
    /// Print the draft as JSON.
    Show,
    /// Set a form field: employee_name, employee_id, email_address,
    /// tasks_completed, status or additional_notes.
    Set { field: String, value: String },
    /// Choose the team the update is for.
    Team { team_id: uuid::Uuid },
    /// Attach a blocker, risk or dependency.
    AddBlocker {
        /// Blockers, Risks or Dependencies.
        #[arg(long = "type", default_value = "Blockers")]
        kind: String,
        #[arg(long)]
        description: String,
        /// YYYY-MM-DD
        #[arg(long)]
        due: String,
    },
    RemoveBlocker { id: String },
    /// Discard the draft.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let http = reqwest::Client::new();

    match cli.command {
        Command::Serve { bind, max_attempts, db, auth, notify } => {
            let store = connect(&db).await?;
            let verifier = HostedAuthClient::new(http.clone(), &auth.auth_url, &auth.auth_api_key);
            let channels = notify.channels();
            if channels.is_empty() {
                warn!("no notification channels configured; updates will be stored only");
            }
            let state = api::AppState::new(store, Arc::new(verifier), channels, max_attempts);
            info!("Starting API server on {bind}");
            api::serve(&bind, state).await?;
        }
        Command::Worker { db, notify, worker } => {
            let store = connect(&db).await?;
            let mut dispatcher = OutboxDispatcher::new(store, worker.dispatch_config());
            for notifier in notify.notifiers(&http) {
                dispatcher.register(notifier);
            }
            if dispatcher.channels().is_empty() {
                bail!("no notification channels configured");
            }
            tokio::select! {
                _ = dispatcher.run() => {}
                _ = tokio::signal::ctrl_c() => info!("worker interrupted"),
            }
        }
        Command::Migrate { db } => {
            info!("Running migrations");
            let pool = db::pool::create_pool(&db.database_url, 2).await?;
            db::pool::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
        Command::Login { email, password, auth } => {
            let (session, _) = session(&cli.client, &auth, &http)?;
            match session.sign_in(&email, &password).await? {
                SessionStatus::Authenticated(user) => {
                    println!("signed in as {} ({})", user.email, user.role);
                }
                SessionStatus::SignedOut => bail!("sign-in failed"),
            }
        }
        Command::Logout { auth } => {
            let (session, _) = session(&cli.client, &auth, &http)?;
            session.sign_out().await?;
            println!("signed out");
        }
        Command::Whoami { auth } => {
            let (session, _) = session(&cli.client, &auth, &http)?;
            session.load().await?;
            match session.settle().await {
                SessionStatus::Authenticated(user) => print_json(&serde_json::to_value(user)?)?,
                SessionStatus::SignedOut => bail!("not signed in"),
            }
        }
        Command::Draft { action } => run_draft(&cli.client, action)?,
        Command::Submit { auth } => {
            let api = api_client(&cli.client, &auth, &http).await?;
            let mut draft = draft_editor(&cli.client)?;
            match api.submit(&draft.to_request()).await? {
                Submitted::Created(update) => {
                    draft.mark_submitted()?;
                    println!("submitted update {}", update["id"].as_str().unwrap_or("?"));
                }
                Submitted::Invalid(errors) => {
                    for (field, message) in errors.fields() {
                        eprintln!("{field}: {message}");
                    }
                    bail!("update was not submitted; fix the fields above with `standup draft set`");
                }
            }
        }
        Command::Mine { start, end, auth } => {
            let api = api_client(&cli.client, &auth, &http).await?;
            let query = query_pairs([("start", start), ("end", end)]);
            print_json(&api.get_json("/api/updates/mine", &query).await?)?;
        }
        Command::Dashboard { team, start, end, tab, auth } => {
            let api = api_client(&cli.client, &auth, &http).await?;
            let query = query_pairs([("team_id", team), ("start", start), ("end", end), ("tab", tab)]);
            print_json(&api.get_json("/api/dashboard", &query).await?)?;
        }
        Command::Export { team, start, end, out, auth } => {
            let api = api_client(&cli.client, &auth, &http).await?;
            let query = query_pairs([("team_id", team), ("start", start), ("end", end)]);
            let csv = api.get_text("/api/dashboard/export.csv", &query).await?;
            let path = out.unwrap_or_else(|| {
                PathBuf::from(standup::csv::export_filename(chrono::Local::now().date_naive()))
            });
            std::fs::write(&path, csv).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
    }

    Ok(())
}

async fn connect(db: &DatabaseArgs) -> anyhow::Result<Arc<dyn Store>> {
    let pool = db::pool::create_pool(&db.database_url, db.max_connections)
        .await
        .context("failed to connect to database")?;
    Ok(Arc::new(PgStore::new(pool)))
}

fn storage(client: &ClientArgs) -> anyhow::Result<Arc<FileStorage>> {
    let dir = client.data_dir()?;
    Ok(Arc::new(FileStorage::open(&dir).with_context(|| format!("opening {}", dir.display()))?))
}

fn session(
    client: &ClientArgs,
    auth: &AuthArgs,
    http: &reqwest::Client,
) -> anyhow::Result<(SessionManager, Arc<FileStorage>)> {
    let storage = storage(client)?;
    let hosted = HostedAuthClient::new(http.clone(), &auth.auth_url, &auth.auth_api_key);
    let backend = RemoteBackend::new(hosted, http.clone(), &client.api_url);
    let manager = SessionManager::new(Arc::new(backend), storage.clone(), SessionConfig::default());
    Ok((manager, storage))
}

/// Validate the cached session and build a client carrying its token.
async fn api_client(client: &ClientArgs, auth: &AuthArgs, http: &reqwest::Client) -> anyhow::Result<ApiClient> {
    let (session, _) = session(client, auth, http)?;
    session.load().await?;
    // A cached load leaves a background check running; see it through.
    if let SessionStatus::SignedOut = session.settle().await {
        bail!("not signed in; run `standup login`");
    }
    let tokens = session
        .stored_session()?
        .context("no stored session; run `standup login`")?;
    Ok(ApiClient::new(http.clone(), &client.api_url, tokens.access_token))
}

fn draft_editor(client: &ClientArgs) -> anyhow::Result<DraftEditor> {
    let storage = storage(client)?;
    let user: Option<CachedUser> = read_json(storage.as_ref(), USER_CACHE_KEY)?;
    Ok(DraftEditor::load(storage as Arc<dyn Storage>, user.as_ref())?)
}

fn run_draft(client: &ClientArgs, action: DraftAction) -> anyhow::Result<()> {
    let mut draft = draft_editor(client)?;
    match action {
        DraftAction::Show => {}
        DraftAction::Set { field, value } => draft.set_field(&field, &value)?,
        DraftAction::Team { team_id } => draft.select_team(team_id)?,
        DraftAction::AddBlocker { kind, description, due } => {
            let kind: BlockerType = kind.parse().map_err(anyhow::Error::msg)?;
            let blocker = draft.add_blocker(kind, &description, &due)?;
            println!("added blocker {}", blocker.id);
        }
        DraftAction::RemoveBlocker { id } => {
            if !draft.remove_blocker(&id)? {
                bail!("no blocker with id {id}");
            }
        }
        DraftAction::Clear => draft.clear()?,
    }

    if draft.has_unsaved_changes() {
        info!("draft has unsubmitted work");
    }
    print_json(&serde_json::json!({
        "fields": draft.fields(),
        "team_id": draft.selected_team(),
        "blockers": draft.blockers(),
    }))
}

fn query_pairs<const N: usize>(pairs: [(&'static str, Option<String>); N]) -> Vec<(&'static str, String)> {
    pairs
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
        .collect()
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
