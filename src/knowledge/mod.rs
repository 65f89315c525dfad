//! Q/A knowledge base that grounds the assistant's persona.
//!
//! Entries are loaded once at startup and never change afterwards; their
//! order in the file is the order they appear in the system prompt.

use crate::config::persona::PersonaConfig;
use log::{info, warn};
use serde::{ Deserialize, Serialize };
use std::collections::{ BTreeMap, BTreeSet };
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::{ Path, PathBuf };
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("failed to read dataset '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset '{path}' is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("dataset entry #{index} is invalid: {reason}")]
    InvalidEntry {
        index: usize,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub category: String,
    #[serde(alias = "input")]
    pub prompt: String,
    #[serde(alias = "output")]
    pub answer: String,
}

#[derive(Deserialize)]
struct DatasetFile {
    #[serde(default)]
    conversations: Vec<KnowledgeEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct KnowledgeStats {
    pub total_entries: usize,
    pub categories: usize,
    pub entries_per_category: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, Default)]
pub struct KnowledgeStore {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeStore {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Result<Self, KnowledgeError> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.prompt.trim().is_empty() {
                return Err(KnowledgeError::InvalidEntry { index, reason: "empty prompt".into() });
            }
            if entry.answer.trim().is_empty() {
                return Err(KnowledgeError::InvalidEntry { index, reason: "empty answer".into() });
            }
        }
        Ok(Self { entries })
    }

    /// Loads the dataset at `path`.
    ///
    /// A missing file yields an empty store; unreadable or malformed content is an error.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, KnowledgeError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Dataset {} not found, starting with an empty knowledge base", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(KnowledgeError::Io { path: path.to_path_buf(), source });
            }
        };
        let store = Self::from_json(&content).map_err(|e| match e {
            KnowledgeError::Malformed { source, .. } =>
                KnowledgeError::Malformed { path: path.to_path_buf(), source },
            other => other,
        })?;
        info!("Loaded {} knowledge entries from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self, KnowledgeError> {
        let file: DatasetFile = serde_json
            ::from_str(json)
            .map_err(|source| KnowledgeError::Malformed { path: PathBuf::new(), source })?;
        Self::new(file.conversations)
    }

    pub fn entries(&self) -> &[KnowledgeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct non-empty categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.category.is_empty())
            .map(|e| e.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn statistics(&self) -> KnowledgeStats {
        let mut entries_per_category = BTreeMap::new();
        for entry in self.entries.iter().filter(|e| !e.category.is_empty()) {
            *entries_per_category.entry(entry.category.clone()).or_insert(0) += 1;
        }
        KnowledgeStats {
            total_entries: self.entries.len(),
            categories: entries_per_category.len(),
            entries_per_category,
        }
    }
}

/// Renders the persona instructions around every Q/A pair, in dataset order.
pub fn build_system_prompt(entries: &[KnowledgeEntry], persona: &PersonaConfig) -> String {
    let mut prompt = format!(
        "You are a helpful assistant representing {}, {}. Here's what you know about {}:\n\n",
        persona.owner_name,
        persona.owner_title,
        persona.owner_first_name()
    );

    for entry in entries {
        let _ = write!(prompt, "Q: {}\nA: {}\n\n", entry.prompt, entry.answer);
    }

    let first = persona.owner_first_name();
    let _ = write!(
        prompt,
        "INSTRUCTIONS:\n\
         - You are \"{assistant}\" - {owner}'s AI knowledge database and digital assistant\n\
         - Use the information above to answer questions about {first}'s background, skills, services, and experience\n\
         - Speak AS {assistant} (an AI system), not as {first}\n\
         - Keep responses conversational, helpful, and slightly tech-savvy\n\
         - If asked about something not in your knowledge base, politely redirect to {first}'s business website ({website}) or email ({email})\n\
         - Don't make up information that isn't provided above\n\
         - Occasionally reference being an \"AI knowledge database\" or \"information system\"\n\
         - Be professional but friendly, with a {specialty} edge\n\
         - Keep responses friendly and approachable but limited in length to {limit} characters\n\n\
         Remember: You represent a {specialty} professional, so maintain that expertise and confidence in your responses.",
        assistant = persona.assistant_name,
        owner = persona.owner_name,
        first = first,
        website = persona.website,
        email = persona.email,
        specialty = persona.specialty,
        limit = persona.response_char_limit,
    );

    prompt
}
