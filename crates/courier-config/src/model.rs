use std::env;
use std::path::PathBuf;

use courier_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-family API credentials. A family with no credential is treated as
/// unconfigured and never selected for a turn.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub openai: Option<String>,
    pub azure: Option<AzureCredential>,
    pub anthropic: Option<String>,
    pub gemini: Option<String>,
    pub groq: Option<String>,
}

/// Azure OpenAI needs both a key and a resource endpoint.
#[derive(Debug, Clone)]
pub struct AzureCredential {
    pub api_key: String,
    pub endpoint: String,
}

/// Model names served by each provider family. Names are disjoint across
/// families; the selector relies on that when resolving the active model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCatalog {
    pub openai: Vec<String>,
    pub azure: Vec<String>,
    pub anthropic: Vec<String>,
    pub gemini: Vec<String>,
    pub groq: Vec<String>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            openai: vec![
                "gpt-4o".into(),
                "gpt-4o-mini".into(),
                "gpt-4-turbo".into(),
                "gpt-3.5-turbo".into(),
            ],
            azure: Vec::new(),
            anthropic: vec![
                "claude-3-5-sonnet-20240620".into(),
                "claude-3-haiku-20240307".into(),
            ],
            gemini: vec!["gemini-1.5-pro".into(), "gemini-1.5-flash".into()],
            groq: vec![
                "llama-3.1-70b-versatile".into(),
                "mixtral-8x7b-32768".into(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    /// Empty list means every user is allowed.
    pub whitelisted_users: Vec<i64>,
    pub default_model: String,
    pub credentials: ProviderCredentials,
    pub models: ModelCatalog,
    pub history_db_path: PathBuf,
    /// Retention policy of the history store, in turns per user.
    pub history_limit: usize,
}

impl AppConfig {
    /// Load configuration from the process environment. `.env` loading is
    /// the binary's responsibility (dotenvy) so tests can set vars directly.
    pub fn from_env() -> Result<Self> {
        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| Error::Config("TELEGRAM_BOT_TOKEN not set".into()))?;

        let credentials = ProviderCredentials {
            openai: non_empty_var("OPENAI_API_KEY"),
            azure: azure_credential_from_env(),
            anthropic: non_empty_var("CLAUDE_API_KEY"),
            gemini: non_empty_var("GEMINI_API_KEY"),
            groq: non_empty_var("GROQ_API_KEY"),
        };

        let mut models = ModelCatalog::default();
        if let Some(list) = non_empty_var("OPENAI_MODELS") {
            models.openai = parse_list(&list);
        }
        if let Some(list) = non_empty_var("AZURE_OPENAI_MODELS") {
            models.azure = parse_list(&list);
        }
        if let Some(list) = non_empty_var("CLAUDE_MODELS") {
            models.anthropic = parse_list(&list);
        }
        if let Some(list) = non_empty_var("GOOGLE_MODELS") {
            models.gemini = parse_list(&list);
        }
        if let Some(list) = non_empty_var("GROQ_MODELS") {
            models.groq = parse_list(&list);
        }

        let default_model = env::var("DEFAULT_MODEL").unwrap_or_else(|_| {
            models
                .openai
                .first()
                .cloned()
                .unwrap_or_else(|| "gpt-4o".into())
        });

        let whitelisted_users = match non_empty_var("WHITELISTED_USERS") {
            Some(raw) => parse_user_ids(&raw),
            None => Vec::new(),
        };

        let history_db_path = env::var("HISTORY_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("courier-history.db"));

        let history_limit = match non_empty_var("HISTORY_LIMIT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("invalid HISTORY_LIMIT: {raw}")))?,
            None => 20,
        };

        Ok(Self {
            telegram_bot_token,
            whitelisted_users,
            default_model,
            credentials,
            models,
            history_db_path,
            history_limit,
        })
    }

    pub fn is_user_allowed(&self, user_id: i64) -> bool {
        self.whitelisted_users.is_empty() || self.whitelisted_users.contains(&user_id)
    }
}

fn azure_credential_from_env() -> Option<AzureCredential> {
    let api_key = non_empty_var("AZURE_OPENAI_API_KEY")?;
    match non_empty_var("AZURE_OPENAI_ENDPOINT") {
        Some(endpoint) => Some(AzureCredential { api_key, endpoint }),
        None => {
            warn!("AZURE_OPENAI_API_KEY set without AZURE_OPENAI_ENDPOINT, ignoring");
            None
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_user_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("ignoring non-numeric user id in WHITELISTED_USERS: {s}");
                None
            }
        })
        .collect()
}
