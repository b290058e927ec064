use idverify::{
    cli::AsciiRenderer,
    common::{paths, Config, DevMode, VerifyError},
    core::{
        conflict::resolve_temp_path, detector, fetch_status, profile, DetectorSlot, DetectorState,
        IdUploader, LocalFile, NotificationCenter, PictureUploader, ResolveOutcome, UploadOutcome,
    },
    protocol::{DecisionAction, Profile, ResolveAction},
    service::{authorization_url, generate_state, ApiClient, AuthSession, CallbackOutcome, OAuthCallback},
    Navigator, Route, SessionContext, TokenStore,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "idverify")]
#[command(about = "Identity verification client: sign-in, ID and profile picture checks")]
struct Cli {
    /// Enable development mode (local config, session and debug output)
    #[arg(long, global = true)]
    dev: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the LinkedIn authorization URL
    LoginUrl,
    /// Complete sign-in from the OAuth redirect (full URL or bare code)
    Callback { redirect: String },
    /// Show the signed-in user
    Whoami,
    /// Forget the local session
    Logout,
    /// Permanently delete the account
    DeleteAccount {
        #[arg(long)]
        yes: bool,
    },
    /// Show verification progress
    Status,
    /// View or edit the profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Submit a national ID document (JPG, PNG or PDF)
    IdUpload { path: PathBuf },
    /// Check and upload a profile picture
    Picture {
        path: PathBuf,
        /// Keep the upload if similar pictures are found
        #[arg(long, conflicts_with = "cancel")]
        proceed: bool,
        /// Discard the upload if similar pictures are found
        #[arg(long)]
        cancel: bool,
    },
    /// Settle an upload left awaiting resolution
    Resolve {
        #[arg(long)]
        temp_path: String,
        #[arg(long, value_enum)]
        action: ResolveArg,
    },
    /// Notification center
    Notifications {
        #[command(subcommand)]
        command: NotificationCommands,
    },
    /// Run local face detection on an image
    Detect { path: PathBuf },
}

#[derive(Subcommand)]
enum ProfileCommands {
    Show,
    /// Replace profile fields from a JSON file
    Update { file: PathBuf },
}

#[derive(Subcommand)]
enum NotificationCommands {
    List,
    Count,
    MarkAllRead,
    Approve { id: String },
    Reject { id: String },
    Dismiss { id: String },
    /// Poll until Ctrl-C
    Watch,
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolveArg {
    Proceed,
    Cancel,
}

impl From<ResolveArg> for ResolveAction {
    fn from(arg: ResolveArg) -> Self {
        match arg {
            ResolveArg::Proceed => ResolveAction::Proceed,
            ResolveArg::Cancel => ResolveAction::Cancel,
        }
    }
}

/// Turns session navigation into hints on stderr.
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::Login => eprintln!("Session ended. Sign in again with `idverify login-url`."),
            Route::LoginFailed => eprintln!("Sign-in failed."),
            Route::Profile => tracing::debug!("Navigating to {}", route.path()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let dev_mode = DevMode::new(cli.dev)?;
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(cli.dev)?,
    };

    let store = TokenStore::new_with_dev_mode(&dev_mode)?;
    let session = Arc::new(SessionContext::with_store(store, Arc::new(TerminalNavigator))?);
    let client = ApiClient::new(&config, session)?;
    let auth = AuthSession::new(client.clone());

    let fallback = fallback_message(&cli.command);
    if let Err(e) = run(cli.command, &config, &dev_mode, &client, &auth).await {
        match e.downcast_ref::<VerifyError>() {
            Some(err) => eprintln!("❌ {}", err.user_message(fallback)),
            None => eprintln!("❌ {:#}", e),
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Shown when a failed request carried no message of its own.
fn fallback_message(command: &Commands) -> &'static str {
    match command {
        Commands::Callback { .. } => "Authentication failed",
        Commands::DeleteAccount { .. } => "Failed to delete account. Please try again.",
        Commands::Status => "Error fetching verification status",
        Commands::Profile { command: ProfileCommands::Show } => "Error loading profile data",
        Commands::Profile { command: ProfileCommands::Update { .. } } => "Error updating profile",
        Commands::IdUpload { .. } => "Error uploading ID",
        Commands::Picture { .. } => "Error uploading profile picture",
        Commands::Resolve { .. } => "Error confirming profile picture",
        Commands::Notifications { .. } => "Failed to fetch notifications",
        _ => "Something went wrong",
    }
}

async fn run(
    command: Commands,
    config: &Config,
    dev_mode: &DevMode,
    client: &ApiClient,
    auth: &AuthSession,
) -> Result<()> {
    match command {
        Commands::LoginUrl => {
            let state = generate_state();
            println!("{}", authorization_url(config, &state)?);
        }
        Commands::Callback { redirect } => {
            let code = if redirect.contains("code=") {
                OAuthCallback::code_from_url(&redirect)
            } else {
                Some(redirect.trim().to_string())
            };
            match OAuthCallback::new().handle(code.as_deref(), auth).await {
                CallbackOutcome::LoggedIn(user) => println!("✅ Signed in as {} <{}>", user.name, user.email),
                CallbackOutcome::MissingCode => anyhow::bail!("No authorization code in the redirect"),
                CallbackOutcome::Failed(message) => anyhow::bail!(message),
                CallbackOutcome::SessionExpired => anyhow::bail!("Sign-in was rejected by the server"),
                CallbackOutcome::AlreadyAttempted => {}
            }
        }
        Commands::Whoami => match auth.check_session().await? {
            Some(user) => {
                println!("{} <{}>", user.name, user.email);
                if let Some(picture) = user.profile_picture {
                    println!("Profile picture: {}", picture.url);
                }
            }
            None => println!("Not signed in"),
        },
        Commands::Logout => {
            auth.logout();
            println!("Signed out");
        }
        Commands::DeleteAccount { yes } => {
            if !yes && !confirm("Delete your account and all verification data?")? {
                println!("Aborted");
                return Ok(());
            }
            auth.delete_account().await?;
            println!("Account deleted");
        }
        Commands::Status => {
            let status = fetch_status(client).await?;
            for (i, label) in idverify::core::status::STEP_LABELS.iter().enumerate() {
                let mark = if i < status.step_index() || status.is_complete() {
                    "✅"
                } else if i == status.step_index() {
                    "➡️ "
                } else {
                    "  "
                };
                println!("{} {}", mark, label);
            }
            if let Some(details) = status.details {
                if let Some(name) = details.name {
                    println!("\nName: {}", name);
                }
                if let Some(updated) = details.updated_at {
                    println!("Last updated: {}", updated.format("%Y-%m-%d %H:%M"));
                }
            }
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Show => {
                let profile = profile::fetch_profile(client).await?;
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            ProfileCommands::Update { file } => {
                let contents = std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?;
                let edited: Profile = serde_json::from_str(&contents)?;
                profile::update_profile(client, &edited).await?;
                println!("✅ Profile updated");
            }
        },
        Commands::IdUpload { path } => {
            let mut uploader = IdUploader::new(client.clone());
            uploader.select_file(LocalFile::from_path(&path)?)?;
            let message = uploader.submit().await?;
            println!("✅ {}", message);
        }
        Commands::Picture { path, proceed, cancel } => {
            let preset = match (proceed, cancel) {
                (true, _) => Some(ResolveAction::Proceed),
                (_, true) => Some(ResolveAction::Cancel),
                _ => None,
            };
            upload_picture(&path, preset, config, dev_mode, client).await?;
        }
        Commands::Resolve { temp_path, action } => {
            match resolve_temp_path(client, &temp_path, action.into()).await? {
                ResolveOutcome::Committed { url } => println!("✅ Profile picture updated: {}", url),
                ResolveOutcome::Cancelled { .. } => println!("Upload cancelled"),
            }
        }
        Commands::Notifications { command } => notifications(command, config, client).await?,
        Commands::Detect { path } => {
            let image = image::open(&path).with_context(|| format!("opening {}", path.display()))?;
            let slot = load_detector(config, dev_mode).await;
            let faces = detector::detect_in_background(slot.current()?, image.clone()).await?;

            println!("Found {} face(s)", faces.len());
            for face in &faces {
                println!(
                    "  ({:.0}, {:.0}) {}x{} confidence {:.2}",
                    face.x1, face.y1, face.width() as u32, face.height() as u32, face.confidence
                );
            }
            if config.preview.enable_ascii_preview {
                let renderer = AsciiRenderer::new(config.preview.ascii_width, config.preview.ascii_height);
                println!("{}", renderer.render(&image, &faces));
            }
            if let Some(debug_path) = dev_mode.get_debug_path("detect") {
                detector::annotate(&image, &faces).save(&debug_path)?;
                println!("Saved annotated image to {}", debug_path.display());
            }
        }
    }

    Ok(())
}

async fn upload_picture(
    path: &Path,
    preset: Option<ResolveAction>,
    config: &Config,
    dev_mode: &DevMode,
    client: &ApiClient,
) -> Result<()> {
    let slot = load_detector(config, dev_mode).await;
    let mut uploader = PictureUploader::new(client.clone(), slot, config.preview.thumbnail_size);

    uploader.select_file(LocalFile::from_path(path)?)?;
    let faces = uploader.detect_face().await;

    if config.preview.enable_ascii_preview {
        if let Some(selected) = uploader.selected() {
            let renderer = AsciiRenderer::new(config.preview.ascii_width, config.preview.ascii_height);
            let shown = faces.as_deref().unwrap_or(&[]);
            println!("{}", renderer.render(&selected.image, shown));
        }
    }
    let faces = faces?;
    println!("✅ Face detected ({} found)", faces.len());

    match uploader.upload().await? {
        UploadOutcome::Committed { url } => {
            println!("✅ Profile picture updated: {}", url);
        }
        UploadOutcome::AwaitingResolution { conflicts } => {
            println!("⚠️  Similar profile pictures found:");
            for conflict in &conflicts {
                println!("   {}% similar: {}", conflict.similarity, conflict.profile_picture);
            }
            if let Some(pending) = uploader.pending() {
                println!("   Pending upload: {}", pending.temp_path);
            }

            let action = match preset {
                Some(action) => action,
                None => match confirm("Proceed with this picture anyway?") {
                    Ok(true) => ResolveAction::Proceed,
                    Ok(false) => ResolveAction::Cancel,
                    Err(e) => {
                        uploader.discard().await;
                        return Err(e);
                    }
                },
            };

            let outcome = match uploader.resolve_or_discard(action).await {
                Ok(outcome) => outcome,
                Err(e) => anyhow::bail!(e.user_message("Error confirming profile picture")),
            };
            match outcome {
                ResolveOutcome::Committed { url } => println!("✅ Profile picture updated: {}", url),
                ResolveOutcome::Cancelled { acknowledged } => {
                    if !acknowledged {
                        tracing::warn!("Server did not confirm the cancellation");
                    }
                    println!("Upload cancelled");
                }
            }
        }
    }

    Ok(())
}

async fn notifications(command: NotificationCommands, config: &Config, client: &ApiClient) -> Result<()> {
    let center = NotificationCenter::new(client.clone());

    match command {
        NotificationCommands::List => {
            center.refresh().await?;
            let list = center.notifications();
            if list.is_empty() {
                println!("No notifications");
            }
            for n in &list {
                let marker = if n.is_unread() { "●" } else { " " };
                println!("{} [{}] {}", marker, n.id, n.kind.title());
                println!("    {}", n.message);
                if let Some(similarity) = n.similarity() {
                    println!("    Similarity: {}%", similarity);
                }
                if let Some(created) = n.created_at {
                    println!("    {}", created.format("%Y-%m-%d %H:%M"));
                }
            }
            println!("\n{} unread", center.unread_count());
        }
        NotificationCommands::Count => {
            center.refresh_unread_count().await?;
            println!("{}", center.unread_count());
        }
        NotificationCommands::MarkAllRead => {
            center.mark_all_read().await?;
            println!("All notifications marked as read");
        }
        NotificationCommands::Approve { id } => {
            center.refresh_list().await?;
            center.act(&id, DecisionAction::Approve).await?;
            println!("Profile picture approved");
        }
        NotificationCommands::Reject { id } => {
            center.refresh_list().await?;
            center.act(&id, DecisionAction::Reject).await?;
            println!("Profile picture rejected");
        }
        NotificationCommands::Dismiss { id } => {
            center.refresh_list().await?;
            center.dismiss(&id).await?;
            println!("Notification removed");
        }
        NotificationCommands::Watch => {
            let interval = Duration::from_secs(config.notifications.poll_interval_seconds);
            let printer = {
                let center = center.clone();
                tokio::spawn(async move {
                    let mut last = None;
                    let mut ticker = tokio::time::interval(Duration::from_secs(1));
                    loop {
                        ticker.tick().await;
                        let unread = center.unread_count();
                        if last != Some(unread) && !center.is_loading() {
                            println!("🔔 {} unread", unread);
                            last = Some(unread);
                        }
                    }
                })
            };
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
            };
            let result = center.poll(interval, shutdown).await;
            printer.abort();
            result?;
        }
    }

    Ok(())
}

async fn load_detector(config: &Config, dev_mode: &DevMode) -> DetectorSlot {
    let models_base = if dev_mode.is_enabled() {
        PathBuf::from(".")
    } else {
        paths::system_models_dir()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"))
    };

    let slot = DetectorSlot::spawn_load(config.clone(), models_base);
    if let DetectorState::Failed(reason) = slot.wait_ready().await {
        tracing::warn!("Face detection unavailable: {}", reason);
    }
    slot
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_writer(io::stderr)
            .init();
    }
}
