use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use medvet_lib::config::{self, GatewayConfig};
use medvet_lib::gateway::{
    AnalysisMode, DiagnosisService, ImageBlob, Intake, LangflowClient, Onset, Species,
};
use medvet_lib::health::{ConnectivityState, HealthMonitor};

#[derive(Debug, Parser)]
#[command(name = "medvet", version, about = "Symptom triage through a LangFlow diagnosis flow")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit one intake and print the report
    Diagnose(DiagnoseArgs),
    /// Probe the backend once
    Status,
    /// Print connectivity changes until interrupted
    Watch(WatchArgs),
}

#[derive(Debug, Parser)]
struct DiagnoseArgs {
    /// human, dog, cat or animal
    #[arg(long, default_value = "human")]
    species: Species,
    #[arg(long)]
    age: String,
    /// 1 to 10
    #[arg(long)]
    severity: u8,
    /// sudden, 1-3days, 1week, weeks, chronic, or free text
    #[arg(long, default_value = "")]
    onset: Onset,
    #[arg(long)]
    history: Option<String>,
    #[arg(long, default_value = "")]
    symptoms: String,
    /// Photo of the affected area
    #[arg(long)]
    image: Option<PathBuf>,
    /// image, text or both
    #[arg(long, default_value = "both")]
    mode: AnalysisMode,
    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct WatchArgs {
    #[arg(long, default_value_t = config::HEALTH_INTERVAL_SECS)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    medvet_lib::init_tracing();
    let cli = Cli::parse();

    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} configuration error: {e}", config::APP_NAME);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(version = config::APP_VERSION, ?config, "{} starting", config::APP_NAME);

    let client = match LangflowClient::from_config(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Diagnose(args) => diagnose(client, &config, args).await,
        Command::Status => status(client).await,
        Command::Watch(args) => watch(client, args).await,
    }
}

async fn diagnose(client: Arc<LangflowClient>, config: &GatewayConfig, args: DiagnoseArgs) -> ExitCode {
    let intake = Intake {
        species: args.species,
        age: args.age,
        severity: args.severity,
        onset: args.onset,
        medical_history: args.history,
        symptoms: args.symptoms,
        image: args.image.map(ImageBlob::from_path),
        mode: args.mode,
    };

    let service = DiagnosisService::from_config(client, config);
    match service.diagnose(&intake).await {
        Ok(result) if args.json => match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Failed to serialize result: {e}");
                ExitCode::FAILURE
            }
        },
        Ok(result) => {
            println!("{}", result.report_text);
            println!();
            println!(
                "Triage: {} ({}), urgency {}/100",
                result.urgency.triage_level,
                result.urgency.recommended_timeframe,
                result.urgency.urgency_score
            );
            ExitCode::SUCCESS
        }
        Err(classified) => {
            eprintln!("{}", classified.user_message);
            ExitCode::FAILURE
        }
    }
}

async fn status(client: Arc<LangflowClient>) -> ExitCode {
    let monitor = HealthMonitor::new(client);
    let state = monitor.check_now().await.unwrap_or(ConnectivityState::Checking);
    print_state(state);
    if state == ConnectivityState::Connected {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn watch(client: Arc<LangflowClient>, args: WatchArgs) -> ExitCode {
    let monitor = HealthMonitor::new(client);
    let mut changes = monitor.subscribe();
    let handle = monitor.start(Duration::from_secs(args.interval_secs.max(1)));

    let mut shown = monitor.state();
    print_state(shown);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                // Periodic probes pass through Checking; only report settled changes
                let state = *changes.borrow_and_update();
                if state != shown && state != ConnectivityState::Checking {
                    print_state(state);
                    shown = state;
                }
            }
        }
    }

    handle.stopped().await;
    ExitCode::SUCCESS
}

fn print_state(state: ConnectivityState) {
    match state.offline_hint() {
        Some(hint) => println!("{state}: {hint}"),
        None => println!("{state}"),
    }
}
