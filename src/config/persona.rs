use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("Persona file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Persona JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid persona: {0}")]
    Invalid(String),
}

/// Who the assistant is and where it sends people when it can't help.
///
/// Feeds both the system prompt and the canned fallback replies. Any field
/// missing from a persona file keeps its built-in value.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PersonaConfig {
    pub assistant_name: String,
    pub owner_name: String,
    pub owner_title: String,
    pub specialty: String,
    pub business_name: String,
    pub website: String,
    pub email: String,
    pub services: Vec<String>,
    pub response_char_limit: usize,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            assistant_name: "The Intersect".to_string(),
            owner_name: "Brenda Hensley".to_string(),
            owner_title: "AppSec Engineer".to_string(),
            specialty: "cybersecurity".to_string(),
            business_name: "TamperTantrum Labs".to_string(),
            website: "https://tampertantrumlabs.com".to_string(),
            email: "hensley.brenda@protonmail.com".to_string(),
            services: vec![
                "Application Security Engineering".to_string(),
                "Security Assessments & Penetration Testing".to_string(),
                "Cybersecurity Consulting".to_string(),
            ],
            response_char_limit: 250,
        }
    }
}

impl PersonaConfig {
    fn validate(&self) -> Result<(), PersonaError> {
        let required = [
            ("assistant_name", &self.assistant_name),
            ("owner_name", &self.owner_name),
            ("website", &self.website),
            ("email", &self.email),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(PersonaError::Invalid(format!("'{}' must not be empty", field)));
            }
        }
        Ok(())
    }

    /// First word of the owner's name, used when addressing them informally.
    pub fn owner_first_name(&self) -> &str {
        self.owner_name.split_whitespace().next().unwrap_or(&self.owner_name)
    }
}

pub fn load_persona_from_str(json: &str) -> Result<PersonaConfig, PersonaError> {
    let config: PersonaConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

/// Loads the persona override at `path`, or the built-in persona when no path is given.
pub fn load_persona<P: AsRef<Path>>(path: Option<P>) -> Result<Arc<PersonaConfig>, PersonaError> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path.as_ref())?;
            let config = load_persona_from_str(&content)?;
            info!("Loaded persona '{}' from {}", config.assistant_name, path.as_ref().display());
            Ok(Arc::new(config))
        }
        None => Ok(Arc::new(PersonaConfig::default())),
    }
}
