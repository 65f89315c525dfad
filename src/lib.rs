pub mod chat;
pub mod cli;
pub mod config;
pub mod history;
pub mod knowledge;
pub mod llm;
pub mod models;
pub mod ratelimit;
pub mod server;

use chat::ChatService;
use cli::Args;
use config::persona::load_persona;
use knowledge::KnowledgeStore;
use llm::{ new_provider, CompletionProvider, LlmConfig, LlmType };
use log::{ debug, info, warn };
use ratelimit::RateLimiter;
use server::{ ApiSettings, AppState, Server };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Builds the provider selected by `args`. A provider that cannot be built is
/// logged and left out; the API then answers chat requests with 503.
pub fn build_provider(args: &Args) -> Option<Arc<dyn CompletionProvider>> {
    let llm_type = match args.chat_llm_type.parse::<LlmType>() {
        Ok(t) => t,
        Err(e) => {
            warn!("Failed to initialize chat provider: {}", e);
            return None;
        }
    };

    let config = match llm_type {
        LlmType::Groq => LlmConfig {
            llm_type,
            api_key: Some(args.groq_api_key.clone()).filter(|k| !k.trim().is_empty()),
            model: Some(args.groq_model.clone()),
            base_url: Some(args.groq_base_url.clone()),
        },
        LlmType::Ollama => LlmConfig {
            llm_type,
            api_key: None,
            model: Some(args.ollama_model.clone()),
            base_url: Some(args.ollama_url.clone()),
        },
    };

    match new_provider(&config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!("Failed to initialize chat provider: {}", e);
            info!("API starting in degraded mode. Check the provider configuration.");
            None
        }
    }
}

fn api_settings(args: &Args) -> ApiSettings {
    let is_ollama = args.chat_llm_type.trim().eq_ignore_ascii_case("ollama");
    ApiSettings {
        trust_proxy: args.trust_proxy,
        backend: args.chat_llm_type.trim().to_lowercase(),
        model: if is_ollama { args.ollama_model.clone() } else { args.groq_model.clone() },
        base_url: if is_ollama { args.ollama_url.clone() } else { args.groq_base_url.clone() },
        credential_present: is_ollama || !args.groq_api_key.trim().is_empty(),
    }
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Listen Address: {}:{}", args.host, args.port);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Groq API Key: {}", args.masked_api_key());
    info!("Ollama URL: {}", args.ollama_url);
    info!("Dataset Path: {}", args.dataset_path);
    info!("Rate Limit: {} requests / {}s", args.rate_limit_requests, args.rate_limit_window);
    info!("CORS Origins: {:?}", args.origins());
    info!("Trust Proxy: {}", args.trust_proxy);
    info!("-------------------------");

    let knowledge = KnowledgeStore::load(&args.dataset_path)?;
    let persona = load_persona(args.persona_path.as_deref())?;

    let provider = build_provider(&args);
    if let Some(provider) = &provider {
        let (connected, message) = provider.check_connection().await;
        if connected {
            info!("Connected to {} with model: {}", provider.llm_type(), provider.model());
        } else {
            warn!("{} connection failed: {}", provider.llm_type(), message);
            info!("API will start anyway; chat requests get fallback replies until the provider is reachable.");
        }
    }
    let stats = knowledge.statistics();
    info!("Knowledge base: {} entries in {} categories", stats.total_entries, stats.categories);
    for (category, count) in &stats.entries_per_category {
        debug!("  {}: {}", category, count);
    }

    let limiter = RateLimiter::new(args.rate_limit_requests, Duration::from_secs(args.rate_limit_window));
    let service = ChatService::new(provider, knowledge, persona, limiter);
    info!("System prompt ready ({} characters)", service.system_prompt().len());

    let state = AppState {
        service: Arc::new(service),
        settings: Arc::new(api_settings(&args)),
    };

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| format!("Invalid listen address {}:{}: {}", args.host, args.port, e))?;
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
