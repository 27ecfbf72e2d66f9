//! # LLM Relay
//!
//! Sends one OpenAI-style chat completion through a configured vendor
//! channel (Baidu ERNIE, Zhipu ChatGLM or Google PaLM) and prints the
//! uniform response, or the raw SSE frames when streaming.
//!
//! ## Usage
//!
//! ```bash
//! llm-relay --config relay.yaml --provider ernie --model ERNIE-Bot "Hello"
//!
//! # Stream, with JSON logs
//! RELAY_LOG_JSON=true llm-relay -c relay.yaml -p glm -m chatglm_pro --stream "Hello"
//! ```

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use relay_config::{load_config, RelayConfig};
use relay_core::{
    ChatMessage, ChatRequest, EstimatingTokenCounter, HttpTransport, ProviderKind, RelayError,
    ReqwestTransport, TokenCounter, TransportConfig,
};
use relay_providers::{
    BaiduConfig, BaiduProvider, PalmConfig, PalmProvider, Provider, ProviderEntry,
    ProviderRegistry, ZhipuConfig, ZhipuProvider,
};
use relay_telemetry::init_logging;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "llm-relay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (.yaml, .yml or .toml)
    #[arg(short, long, env = "RELAY_CONFIG", default_value = "relay.yaml")]
    config: PathBuf,

    /// Provider id from the configuration
    #[arg(short, long)]
    provider: String,

    /// Model name
    #[arg(short, long)]
    model: String,

    /// Stream the response as SSE frames
    #[arg(long)]
    stream: bool,

    /// Prompt token count; estimated from the messages when omitted
    #[arg(long)]
    prompt_tokens: Option<u32>,

    /// Optional system message
    #[arg(long)]
    system: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    temperature: Option<f32>,

    /// User message
    message: String,
}

/// Application entry point
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RelayError>() {
            Some(relay_error) => {
                error!(error = %relay_error, status = relay_error.status_code(), "Request failed");
                if let Ok(body) = serde_json::to_string_pretty(&relay_error.to_error_body()) {
                    println!("{body}");
                }
            }
            None => {
                error!(error = %e, "Relay failed");
                eprintln!("Error: {e:#}");
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        providers = config.providers.len(),
        "Starting LLM relay"
    );

    let registry = create_provider_registry(&config)?;
    let entry = registry
        .get(&cli.provider)
        .with_context(|| format!("unknown provider '{}'", cli.provider))?;

    let mut messages = Vec::new();
    if let Some(system) = &cli.system {
        messages.push(ChatMessage::system(system.as_str()));
    }
    messages.push(ChatMessage::user(cli.message.as_str()));

    let prompt_tokens = cli.prompt_tokens.unwrap_or_else(|| {
        let counter = EstimatingTokenCounter::default();
        messages
            .iter()
            .map(|m| counter.count_tokens(&m.text(), &cli.model))
            .sum()
    });

    let mut builder = ChatRequest::builder()
        .model(cli.model.as_str())
        .messages(messages)
        .stream(cli.stream);
    if let Some(temperature) = cli.temperature {
        builder = builder.temperature(temperature);
    }
    let request = builder.build()?;
    let ctx = entry.context(prompt_tokens);

    if cli.stream {
        let stream = entry.provider.chat_completion_stream(&request, &ctx).await?;
        let (mut frames, usage) = stream.into_parts();
        let mut stdout = std::io::stdout();
        while let Some(frame) = frames.next().await {
            stdout.write_all(&frame.encode())?;
            stdout.flush()?;
        }
        if let Some(usage) = usage.wait().await {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Stream usage"
            );
        }
    } else {
        let response = entry.provider.chat_completion(&request, &ctx).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}

/// Create the provider registry from configuration
fn create_provider_registry(config: &RelayConfig) -> anyhow::Result<ProviderRegistry> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(
        &TransportConfig::from(&config.transport),
    )?);
    let registry = ProviderRegistry::new();
    let lookahead = config.credentials.lookahead;

    for provider_config in config.enabled_providers() {
        let id = provider_config.id.as_str();
        let base_url = provider_config.base_url.as_deref();

        let provider: Provider = match provider_config.kind {
            ProviderKind::Baidu => {
                let mut baidu = BaiduConfig::new(id).with_lookahead(lookahead);
                if let Some(url) = base_url {
                    baidu = baidu.with_base_url(url);
                }
                BaiduProvider::new(baidu, Arc::clone(&transport)).into()
            }
            ProviderKind::Zhipu => {
                let mut zhipu = ZhipuConfig::new(id)
                    .with_lookahead(lookahead)
                    .with_token_ttl(config.credentials.signed_token_ttl);
                if let Some(url) = base_url {
                    zhipu = zhipu.with_base_url(url);
                }
                ZhipuProvider::new(zhipu, Arc::clone(&transport)).into()
            }
            ProviderKind::Palm => {
                let mut palm = PalmConfig::new(id);
                if let Some(url) = base_url {
                    palm = palm.with_base_url(url);
                }
                PalmProvider::new(palm, Arc::clone(&transport)).into()
            }
        };

        registry.register(ProviderEntry::new(provider, provider_config.credential()))?;
    }

    info!(providers = ?registry.provider_ids(), "Provider registry initialized");
    Ok(registry)
}
