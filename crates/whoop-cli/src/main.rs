use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tokio::task;
use tracing_subscriber::EnvFilter;
use url::Url;
use whoop_core::api::{ApiClient, ApiError, DateRange, HealthData, ResourceKind};
use whoop_core::auth::{run_manual_flow, AuthError, AuthManager, FileTokenStore, OAuthClient};
use whoop_core::config::Settings;

const DEFAULT_OUTPUT: &str = "data/whoop_data.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "WHOOP health data sync")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Show the authenticated user's profile and body measurements
    Profile(ProfileArgs),
    /// Download recovery, sleep, cycle and workout records
    Fetch(FetchArgs),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Authorize this application with WHOOP
    Login(LoginArgs),
    /// Revoke access and forget stored tokens
    Logout,
    /// Show whether tokens are stored and when they expire
    Status,
}

#[derive(Args, Debug)]
struct LoginArgs {
    /// Print the authorization URL without launching a browser
    #[arg(long)]
    no_browser: bool,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// First day to fetch (YYYY-MM-DD); defaults to DATA_START_DATE
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to fetch, inclusive (YYYY-MM-DD); defaults to DATA_END_DATE
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Where to write the JSON output
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout => auth_logout().await?,
            AuthCommand::Status => auth_status().await?,
        },
        Commands::Profile(args) => profile(args).await?,
        Commands::Fetch(args) => fetch(args).await?,
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings() -> Result<Settings> {
    Settings::from_env().context("failed to load WHOOP settings from the environment")
}

fn build_manager(settings: &Settings) -> Result<Arc<AuthManager<FileTokenStore>>> {
    let store =
        FileTokenStore::with_default_locator().context("unable to initialise token store")?;
    let oauth =
        OAuthClient::new(settings.oauth_config()).context("failed to build OAuth client")?;
    let manager = AuthManager::load(store, oauth).context("failed to load stored tokens")?;
    Ok(Arc::new(manager))
}

fn build_client(settings: &Settings) -> Result<ApiClient<FileTokenStore>> {
    let manager = build_manager(settings)?;
    ApiClient::new(manager).context("failed to build API client")
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let settings = load_settings()?;
    let manager = build_manager(&settings)?;

    let tokens = match run_manual_flow(
        &*manager,
        !args.no_browser,
        print_authorization_url,
        prompt_for_redirect,
    )
    .await
    {
        Err(AuthError::BrowserLaunch(reason)) => {
            eprintln!("Failed to launch browser ({reason}); open the URL manually.");
            run_manual_flow(&*manager, false, print_authorization_url, prompt_for_redirect).await
        }
        other => other,
    }
    .context("authorization failed")?;

    println!("Login succeeded. Tokens stored.");
    println!("Token expires at {} (UTC).", tokens.expires_at);
    if tokens.refresh_token.is_none() {
        println!("No refresh token was granted; you will need to log in again after expiry.");
    }
    Ok(())
}

async fn auth_logout() -> Result<()> {
    let settings = load_settings()?;
    let manager = build_manager(&settings)?;
    manager
        .revoke()
        .await
        .context("failed to remove stored tokens")?;
    println!("Access revoked and local tokens removed.");
    Ok(())
}

async fn auth_status() -> Result<()> {
    let settings = load_settings()?;
    let manager = build_manager(&settings)?;
    match manager.current_tokens().await {
        None => println!("Not authenticated. Run `whoop auth login`."),
        Some(tokens) => {
            let state = if tokens.is_expired() {
                "expired"
            } else {
                "valid"
            };
            println!(
                "Authenticated: {}",
                if manager.is_authenticated().await {
                    "yes"
                } else {
                    "access token only"
                }
            );
            println!("Token type: {}", tokens.token_type);
            println!(
                "Access token {state}; expires at {} (now {}).",
                tokens.expires_at,
                Utc::now()
            );
        }
    }
    Ok(())
}

async fn profile(args: ProfileArgs) -> Result<()> {
    let settings = load_settings()?;
    let client = build_client(&settings)?;
    let profile = client
        .user_profile()
        .await
        .map_err(explain_auth)
        .context("profile request failed")?;
    let body = client
        .body_measurements()
        .await
        .map_err(explain_auth)
        .context("body measurement request failed")?;

    if args.json {
        let json = serde_json::json!({ "profile": profile, "body": body });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{} (id {})", profile.display_name(), profile.user_id);
    if let Some(email) = &profile.email {
        println!("Email: {email}");
    }
    if let Some(height) = body.height_meter {
        println!("Height: {height:.2} m");
    }
    if let Some(weight) = body.weight_kilogram {
        println!("Weight: {weight:.1} kg");
    }
    if let Some(max_hr) = body.max_heart_rate {
        println!("Max heart rate: {max_hr} bpm");
    }
    Ok(())
}

async fn fetch(args: FetchArgs) -> Result<()> {
    let settings = load_settings()?;
    let start = args.start.unwrap_or(settings.data_start);
    let end = args.end.unwrap_or(settings.data_end);
    let range = DateRange::new(start, end)?;

    let client = build_client(&settings)?;
    if !client.auth().is_authenticated().await {
        return Err(anyhow!("not authenticated; run `whoop auth login` first"));
    }

    let data = client
        .all_health_data(&range)
        .await
        .map_err(explain_auth)
        .context("health data request failed")?;

    for kind in ResourceKind::ALL {
        println!("{:<10} {:>5} records", kind.key(), data.records(kind).len());
    }
    for (kind, reason) in &data.failures {
        eprintln!("warning: {kind} could not be fetched: {reason}");
    }
    let limits = client.rate_limit().await;
    if let Some(remaining) = limits.remaining {
        println!(
            "Rate limit remaining: {remaining}{}",
            limits
                .reset
                .map(|reset| format!(" (resets in {reset}s)"))
                .unwrap_or_default()
        );
    }

    write_json(&args.output, &data)?;
    println!("Saved to {}", args.output.display());
    Ok(())
}

fn write_json(path: &Path, value: &HealthData) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_string_pretty(value)?;
    std::fs::write(path, payload).with_context(|| format!("failed to write {}", path.display()))
}

fn explain_auth(err: ApiError) -> anyhow::Error {
    let reauthorize = matches!(&err, ApiError::Auth(auth) if auth.requires_reauthorization());
    let err = anyhow!(err);
    if reauthorize {
        err.context("please re-authenticate with `whoop auth login`")
    } else {
        err
    }
}

async fn prompt_for_redirect() -> Result<String, AuthError> {
    task::spawn_blocking(|| {
        use std::io::{self, Write};
        print!("Paste the full redirect URL from your browser: ");
        io::stdout().flush().map_err(AuthError::Io)?;
        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(AuthError::Io)?;
        Ok(input.trim().to_owned())
    })
    .await
    .map_err(|_| AuthError::Cancelled)?
}

fn print_authorization_url(url: &Url) -> Result<(), AuthError> {
    println!("\nAuthorize the application by visiting:\n  {}\n", url);
    Ok(())
}
