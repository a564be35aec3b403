// src/main.rs
use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use spec2test::api::{AppState, configure_routes};
use spec2test::banner;
use spec2test::config::AppConfig;
use spec2test::errors::Result;
use spec2test::generator;
use spec2test::models::{BundleRequest, ResponseFormat, RunRequest, TestsMode};

#[derive(Parser)]
#[command(name = "spec2test", version, about = "Generate and run pytest tests from a human spec")]
struct Cli {
    /// Optional TOML config file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Generate and save tests
    Generate {
        /// Path to Python module (e.g. under_test.py)
        code_path: PathBuf,
        /// Description of what the function does
        #[arg(short, long, default_value = "n/a")]
        spec: String,
        /// Cleanup old tests (per-symbol mode)
        #[arg(long)]
        cleanup: bool,
        /// Symbol to test; detected from the module when omitted
        #[arg(long)]
        symbol: Option<String>,
        /// Ask the model for a JSON payload instead of marker-delimited text
        #[arg(long)]
        json: bool,
    },
    /// Run generated tests via pytest
    Run {
        /// Force enable run mode (same as ENABLE_RUN=1)
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        code_path: Option<String>,
        #[arg(long)]
        tests_path: Option<String>,
    },
}

#[actix_web::main]
async fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("⚠️  Warning: Could not load .env file: {}", e);
    }

    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {} [{}]", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env()?,
    };

    match cli.command {
        Command::Serve { host, port } => {
            banner::print_banner();
            serve(config, &host, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate { code_path, spec, cleanup, symbol, json } => {
            let code = std::fs::read_to_string(&code_path)?;
            let mut req = BundleRequest::new(code, spec);
            req.module_path = code_path.display().to_string();
            req.symbol = symbol;
            req.tests_mode = if cleanup { TestsMode::PerSymbol } else { TestsMode::Single };
            req.cleanup_old = cleanup;
            if json {
                req.format = ResponseFormat::Json;
            }

            let state = AppState::new(config)?;
            let resp = state.generator().generate_and_save(&req).await?;
            println!("✅ Generated tests:");
            println!("{}", serde_json::to_string_pretty(&resp)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { enable, code_path, tests_path } => {
            if enable {
                config.run_enabled = true;
            }
            if !config.run_enabled {
                println!("❌ Run mode disabled. Use '--enable' to override.");
                return Ok(ExitCode::FAILURE);
            }

            let outcome = generator::run_existing(&config, &RunRequest { code_path, tests_path }).await?;
            println!("✅ Pytest output:\n");
            println!("{}", outcome.output);
            println!("Exit code: {}", outcome.exit_code);
            Ok(ExitCode::from(outcome.exit_status()))
        }
    }
}

async fn serve(config: AppConfig, host: &str, port: u16) -> Result<()> {
    let state = AppState::new(config)?;

    log::info!("🚀 Starting server on http://{}:{}", host, port);
    log::info!(
        "🤖 Model: {} (fallback: {}), run enabled: {}",
        state.config.model,
        state.config.fallback_model,
        state.config.run_enabled
    );

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind((host, port))?
    .run()
    .await?;

    Ok(())
}
