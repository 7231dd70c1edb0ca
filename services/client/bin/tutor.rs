//! `tutor`: practise spoken English with a realtime AI tutor from the
//! terminal.
//!
//! Account and history commands talk to the backend REST API. `talk` opens a
//! WebRTC voice session for one topic and prints the progress report the
//! tutor writes at the end.

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use openai_realtime::{SessionNegotiator, WebRtcTransport};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::watch,
};
use tracing::{info, warn};
use tutor_client::{
    ApiClient, ApiError, AuthService, Config, EphemeralKeyService, FileTokenStore,
    MicrophoneSource, Profile, ProfileService, ProgressService, SpeakerSink, TopicService,
};
use tutor_core::{
    Collaborators, ConnectionState, NoAudioRouting, ProgressReport, SessionController,
    SessionSettings, UiState,
};

#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "Conversational English practice with a realtime AI tutor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Signup(Credentials),
    /// Sign in with an existing account
    Login(Credentials),
    /// Forget the stored session token
    Logout,
    /// List conversation topics
    Topics {
        /// Only topics you have completed
        #[arg(long)]
        completed: bool,
    },
    /// Show saved progress reports, newest first
    History,
    /// Show or update your profile
    Profile(ProfileArgs),
    /// Start a voice conversation on a topic
    Talk {
        /// Topic id, see `tutor topics`
        #[arg(long)]
        topic: i64,
        /// Override the topic's instructions for the tutor
        #[arg(long)]
        instructions: Option<String>,
        /// Connect without opening the microphone or speaker
        #[arg(long)]
        no_audio: bool,
    },
}

#[derive(Args)]
struct Credentials {
    email: String,
    #[arg(long)]
    password: String,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    english_level: Option<String>,
    #[arg(long)]
    picture_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    let tokens = Arc::new(FileTokenStore::new(&config.token_path));
    let api = ApiClient::new(&config.api_base_url, tokens);

    match cli.command {
        Commands::Signup(creds) => {
            let user = AuthService::new(api)
                .signup(&creds.email, &creds.password)
                .await
                .context("Sign-up failed")?;
            println!("Account created. Signed in as {}.", user.email);
        }
        Commands::Login(creds) => {
            let user = AuthService::new(api)
                .login(&creds.email, &creds.password)
                .await
                .context("Login failed")?;
            println!("Signed in as {}.", user.email);
        }
        Commands::Logout => {
            AuthService::new(api)
                .logout()
                .context("Failed to remove the stored token")?;
            println!("Signed out.");
        }
        Commands::Topics { completed } => {
            let service = TopicService::new(api);
            let topics = if completed {
                service.completed().await
            } else {
                service.list().await
            }
            .map_err(signed_in_hint)
            .context("Failed to load topics")?;
            if topics.is_empty() {
                println!("No topics.");
            }
            for topic in topics {
                let level = topic.difficulty_level.as_deref().unwrap_or("-");
                println!("{:>4}  [{}] {}", topic.id, level, topic.title);
                if let Some(description) = topic.description {
                    println!("      {}", description);
                }
            }
        }
        Commands::History => {
            let entries = ProgressService::new(api)
                .history()
                .await
                .map_err(signed_in_hint)
                .context("Failed to load progress history")?;
            if entries.is_empty() {
                println!("No sessions yet.");
            }
            for entry in entries {
                print_report(&entry.report);
                println!();
            }
        }
        Commands::Profile(args) => {
            let service = ProfileService::new(api);
            let changes = Profile {
                id: None,
                name: args.name,
                profile_picture_url: args.picture_url,
                english_level: args.english_level,
            };
            let profile = if changes == Profile::default() {
                service.get().await
            } else {
                service.update(&changes).await
            }
            .map_err(signed_in_hint)
            .context("Failed to load profile")?;
            println!("Name:          {}", profile.name.as_deref().unwrap_or("-"));
            println!("English level: {}", profile.english_level.as_deref().unwrap_or("-"));
            println!(
                "Picture:       {}",
                profile.profile_picture_url.as_deref().unwrap_or("-")
            );
        }
        Commands::Talk {
            topic,
            instructions,
            no_audio,
        } => talk(&config, api, topic, instructions, !no_audio).await?,
    }

    Ok(())
}

/// Runs one voice session on `topic_id` and prints its final report.
async fn talk(
    config: &Config,
    api: ApiClient,
    topic_id: i64,
    instructions: Option<String>,
    audio: bool,
) -> anyhow::Result<()> {
    let topics = TopicService::new(api.clone());
    let topic = topics
        .find(topic_id)
        .await
        .map_err(signed_in_hint)
        .context("Failed to load topics")?
        .with_context(|| format!("No topic with id {}", topic_id))?;
    let instructions = instructions.unwrap_or_else(|| topic.prompt_context.clone());
    info!(topic_id, title = %topic.title, "Starting conversation");

    let transport = if audio {
        with_audio_devices(WebRtcTransport::new())
    } else {
        WebRtcTransport::new()
    };
    let negotiator = SessionNegotiator::new(
        Arc::new(transport),
        config.gateway(),
        config.peer(),
    );
    let controller = SessionController::new(
        negotiator,
        Collaborators {
            tokens: Arc::new(EphemeralKeyService::new(api.clone())),
            progress: Arc::new(ProgressService::new(api)),
            audio: Arc::new(NoAudioRouting),
        },
        SessionSettings {
            connect_timeout: config.connect_timeout,
            ..SessionSettings::default()
        },
    );
    let printer = tokio::spawn(print_updates(controller.subscribe()));

    println!("Topic: {}", topic.title);
    controller.connect(&instructions).await;
    if let ConnectionState::Error(message) = controller.state().connection_state {
        printer.abort();
        bail!("Could not start the conversation: {}", message);
    }

    println!("Talk with your tutor. Press Enter (or Ctrl+C) to finish.");
    tokio::select! {
        _ = wait_for_enter() => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    let outcome = if controller.state().connection_state == ConnectionState::Connected {
        controller
            .request_final_report()
            .await
            .context("Failed to request the final report")?;
        let mut ui = controller.subscribe();
        tokio::select! {
            outcome = wait_for_outcome(&mut ui) => outcome,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted while waiting for the final report");
                None
            }
        }
    } else {
        None
    };

    controller.disconnect().await;
    printer.abort();

    match outcome {
        Some(Ok(report)) => {
            println!();
            print_report(&report);
            match topics.complete(topic_id).await {
                Ok(()) => println!("Topic marked as completed."),
                Err(ApiError::Status { code: 409, .. }) => {}
                Err(e) => warn!(error = %e, "Failed to mark topic completed"),
            }
            Ok(())
        }
        Some(Err(message)) => bail!("Session ended with an error: {}", message),
        None => {
            println!("Session ended without a report.");
            Ok(())
        }
    }
}

/// Attaches the default microphone and speaker. A missing device is logged
/// and the session goes ahead without it.
fn with_audio_devices(transport: WebRtcTransport) -> WebRtcTransport {
    let transport = match MicrophoneSource::default_input() {
        Ok(microphone) => {
            info!(device = microphone.name(), "Using microphone");
            transport.with_microphone(Arc::new(microphone))
        }
        Err(e) => {
            warn!(error = %e, "Microphone unavailable; the tutor will not hear you");
            transport
        }
    };
    match SpeakerSink::default_output().and_then(|speaker| {
        let sink = speaker.start()?;
        info!(device = speaker.name(), "Using speaker");
        Ok(sink)
    }) {
        Ok(sink) => transport.with_remote_audio(sink),
        Err(e) => {
            warn!(error = %e, "Speaker unavailable; transcripts only");
            transport
        }
    }
}

/// Waits until the session either publishes a report or fails.
async fn wait_for_outcome(
    ui: &mut watch::Receiver<UiState>,
) -> Option<Result<ProgressReport, String>> {
    let state = ui
        .wait_for(|state| {
            state.final_report.is_some()
                || !state.connection_state.is_active()
        })
        .await
        .ok()?
        .clone();
    match (state.final_report, state.connection_state) {
        (Some(report), _) => Some(Ok(report)),
        (None, ConnectionState::Error(message)) => Some(Err(message)),
        (None, _) => None,
    }
}

async fn wait_for_enter() {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if let Err(e) = lines.next_line().await {
        warn!(error = %e, "Failed to read stdin");
    }
}

/// Echoes status changes and finished tutor utterances.
async fn print_updates(mut ui: watch::Receiver<UiState>) {
    let mut last_status = String::new();
    let mut was_speaking = false;
    while ui.changed().await.is_ok() {
        let state = ui.borrow_and_update().clone();
        if state.status_message != last_status {
            println!("· {}", state.status_message);
            last_status = state.status_message;
        }
        if was_speaking && !state.is_ai_speaking && !state.ai_response_text.is_empty() {
            println!("Tutor: {}", state.ai_response_text);
        }
        was_speaking = state.is_ai_speaking;
    }
}

fn print_report(report: &ProgressReport) {
    println!(
        "{}  ({} min, level {})",
        report.session_date.format("%Y-%m-%d %H:%M UTC"),
        report.duration_minutes,
        report.suggested_level
    );
    println!("  {}", report.ai_summary);
    if !report.topics_discussed.is_empty() {
        println!("  Topics: {}", report.topics_discussed.join(", "));
    }
    if !report.new_vocabulary.is_empty() {
        println!("  Vocabulary: {}", report.new_vocabulary.join(", "));
    }
    for point in &report.grammar_points {
        println!("  Grammar: {} ({})", point.point, point.status);
        for example in &point.examples {
            println!("    - {}", example);
        }
    }
}

fn signed_in_hint(err: ApiError) -> anyhow::Error {
    if err.is_auth() {
        anyhow::Error::new(err).context("Not signed in. Run `tutor login` first")
    } else {
        err.into()
    }
}
