use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address for the HTTP API to bind to.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP API to listen on.
    #[arg(long, env = "PORT", default_value = "8080")]
    pub port: u16,

    /// Comma separated list of origins allowed to call the API from a browser.
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://localhost:8080,https://tampertantrumlabs.com,https://www.tampertantrumlabs.com"
    )]
    pub allowed_origins: Vec<String>,

    /// Use the first X-Forwarded-For hop as the client address (set when running behind a proxy).
    #[arg(long, env = "TRUST_PROXY", default_value = "false")]
    pub trust_proxy: bool,

    // --- Rate Limit Args ---
    /// Maximum number of requests a single client may make per window.
    #[arg(long, env = "RATE_LIMIT_REQUESTS", default_value = "10",
        value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit_requests: u32,

    /// Length of the sliding rate limit window, in seconds.
    #[arg(long, env = "RATE_LIMIT_WINDOW", default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_limit_window: u64,

    // --- Chat LLM Provider Args ---
    /// Provider used for chat completion (groq, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "groq")]
    pub chat_llm_type: String,

    /// API key for the Groq cloud API. Leaving it empty starts the provider in degraded mode.
    #[arg(long, env = "GROQ_API_KEY", default_value = "", hide_env_values = true)]
    pub groq_api_key: String,

    /// Model name used with Groq.
    #[arg(long, env = "GROQ_MODEL", default_value = "llama-3.1-8b-instant")]
    pub groq_model: String,

    /// Base URL of the Groq OpenAI compatible API.
    #[arg(long, env = "GROQ_BASE_URL", default_value = "https://api.groq.com/openai/v1")]
    pub groq_base_url: String,

    /// Base URL of the self-hosted Ollama service.
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    /// Model name served by Ollama.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1")]
    pub ollama_model: String,

    // --- Knowledge Args ---
    /// Path to the knowledge base (Q/A dataset) file.
    #[arg(long, env = "DATASET_PATH", default_value = "json/portfolio_dataset.json")]
    pub dataset_path: String,

    /// Optional path to a persona JSON file overriding the built-in persona.
    #[arg(long, env = "PERSONA_PATH")]
    pub persona_path: Option<String>,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Origins with surrounding whitespace and empty entries removed.
    pub fn origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }

    pub fn masked_api_key(&self) -> String {
        let key = self.groq_api_key.trim();
        if key.chars().count() > 4 {
            let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            format!("***{}", tail)
        } else {
            "None".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_origins_and_limits_from_flags() {
        let args = Args::parse_from([
            "portfolio-chat",
            "--allowed-origins",
            "https://a.example, ,https://b.example",
            "--rate-limit-requests",
            "3",
            "--rate-limit-window",
            "5",
        ]);
        assert_eq!(args.origins(), vec!["https://a.example", "https://b.example"]);
        assert_eq!(args.rate_limit_requests, 3);
        assert_eq!(args.rate_limit_window, 5);
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let res = Args::try_parse_from(["portfolio-chat", "--rate-limit-requests", "0"]);
        assert!(res.is_err());
    }

    #[test]
    fn masks_all_but_last_four_characters() {
        let mut args = Args::parse_from(["portfolio-chat", "--groq-api-key", "gsk_abcdef1234"]);
        assert_eq!(args.masked_api_key(), "***1234");
        args.groq_api_key = String::new();
        assert_eq!(args.masked_api_key(), "None");
    }
}
