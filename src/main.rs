//! 命令行入口
//!
//! 所有结果以格式化 JSON 输出到标准输出；错误输出到标准错误并以状态码 1 退出。
//! 命令行不带网络后端，`translate` 使用后缀模式的模拟后端。

use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;

use locplat::env::{core::LogLevel, EnvVar};
use locplat::translation::config::load_field_config;
use locplat::translation::error::helpers::log_error;
use locplat::translation::{
    translate_with_config, ConfigManager, FieldConfig, MemoryCacheStore, MemoryConfigStore,
    MockMode, MockTranslator, PipelineSettings, TranslationError, TranslationResult,
    TranslationService,
};

const CLIENT: &str = "cli";
const COLLECTION: &str = "records";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level: trace, debug, info, warn, error
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Pipeline settings file (TOML or JSON)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract translatable fields from a record
    Extract {
        /// Field configuration file
        #[arg(long)]
        config: PathBuf,
        /// Record JSON file
        #[arg(long)]
        record: PathBuf,
        /// Target locale
        #[arg(long)]
        locale: String,
    },
    /// Preview what would be translated, without calling a backend
    Preview {
        /// Field configuration file
        #[arg(long)]
        config: PathBuf,
        /// Record JSON file
        #[arg(long)]
        record: PathBuf,
        /// Target locale
        #[arg(long)]
        locale: String,
    },
    /// Validate the field paths of a configuration
    Validate {
        /// Field configuration file
        #[arg(long)]
        config: PathBuf,
    },
    /// Translate a record with the mock backend and print the materialized record
    Translate {
        /// Field configuration file
        #[arg(long)]
        config: PathBuf,
        /// Record JSON file
        #[arg(long)]
        record: PathBuf,
        /// Source locale (defaults to the configured source locale)
        #[arg(long)]
        source: Option<String>,
        /// Target locale
        #[arg(long)]
        target: String,
    },
    /// Write an example settings file
    InitSettings {
        /// Output path
        path: PathBuf,
    },
    /// Print the supported environment variables
    EnvDocs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    match run(cli).await {
        Ok(valid) => {
            if !valid {
                process::exit(1);
            }
        }
        Err(e) => {
            log_error(&e);
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_logging(cli_level: Option<&str>) {
    let level = cli_level
        .map(str::to_string)
        .or_else(|| LogLevel::get().ok())
        .unwrap_or_else(|| "info".to_string());
    let level = tracing::Level::from_str(&level).unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(path: Option<&Path>) -> TranslationResult<PipelineSettings> {
    let manager = match path {
        Some(path) => ConfigManager::from_file(path)?,
        None => ConfigManager::new()?,
    };
    Ok(manager.into_settings())
}

fn read_record(path: &Path) -> TranslationResult<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TranslationError::Store(format!("无法读取记录文件 {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

fn print_json<T: Serialize>(value: &T) -> TranslationResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn local_service(
    config: FieldConfig,
    settings: PipelineSettings,
) -> TranslationService<MemoryConfigStore, MemoryCacheStore> {
    let capacity = settings.cache_capacity;
    TranslationService::new(
        MemoryConfigStore::with_config(CLIENT, COLLECTION, config),
        MemoryCacheStore::new(capacity),
        settings,
    )
}

/// 执行命令，返回值表示结果是否有效
async fn run(cli: Cli) -> TranslationResult<bool> {
    match cli.command {
        Commands::Extract {
            config,
            record,
            locale,
        } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let service = local_service(load_field_config(&config)?, settings);
            let outcome = service
                .extract(&read_record(&record)?, CLIENT, COLLECTION, &locale)
                .await?;
            print_json(&outcome.result)?;
        }
        Commands::Preview {
            config,
            record,
            locale,
        } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let service = local_service(load_field_config(&config)?, settings);
            let preview = service
                .preview(&read_record(&record)?, CLIENT, COLLECTION, &locale)
                .await?;
            print_json(&preview)?;
        }
        Commands::Validate { config } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let field_config = load_field_config(&config)?;
            let paths = field_config.field_paths.clone();
            let service = local_service(field_config, settings);
            let report = service.validate_paths(CLIENT, COLLECTION, &paths).await?;
            print_json(&report)?;
            return Ok(report.valid);
        }
        Commands::Translate {
            config,
            record,
            source,
            target,
        } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let source = source.unwrap_or_else(|| settings.source_locale.clone());
            let translator = MockTranslator::new(MockMode::Suffix);
            let outcome = translate_with_config(
                &read_record(&record)?,
                load_field_config(&config)?,
                &source,
                &target,
                &translator,
                settings,
            )
            .await?;
            print_json(&outcome)?;
        }
        Commands::InitSettings { path } => {
            ConfigManager::generate_example_config(&path)?;
            eprintln!("示例设置已写入 {}", path.display());
        }
        Commands::EnvDocs => {
            println!("{}", locplat::env::generate_env_docs());
        }
    }

    Ok(true)
}
