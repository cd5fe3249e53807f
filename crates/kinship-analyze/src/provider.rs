//! Inference providers.
//!
//! The extractor talks to an [`InferenceProvider`] through three blocking,
//! timeout-bounded calls. [`LocalProvider`] answers from the file's own
//! text; [`HttpProvider`] speaks an OpenAI-compatible API. The
//! [`FallbackProvider`] combinator tries a remote provider first and lets
//! the local one answer whenever it fails.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use strum::{Display, IntoEnumIterator};
use tracing::{debug, warn};

use kinship_core::{ProjectType, ProviderConfig, ProviderError};

use crate::tokenize::{content_terms, split_name};

/// Dimensions of the local hashed embedding.
pub const LOCAL_DIMENSIONS: usize = 64;

/// Consecutive failures after which the remote provider is skipped.
const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Tags returned per request.
const MAX_TAGS: usize = 5;

/// Indicator keywords per project type.
pub const TYPE_INDICATORS: &[(ProjectType, &[&str])] = &[
    (
        ProjectType::Academic,
        &["research", "paper", "study", "assignment", "thesis", "essay", "report"],
    ),
    (
        ProjectType::Music,
        &["song", "music", "band", "album", "track", "recording", "audio"],
    ),
    (
        ProjectType::Photos,
        &["photo", "picture", "image", "vacation", "trip", "event"],
    ),
    (
        ProjectType::Work,
        &["project", "meeting", "presentation", "business", "client", "proposal"],
    ),
];

/// Kind of inference requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum InferenceTask {
    Classify,
    Embed,
    Tag,
}

/// Input of an inference call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceRequest {
    /// Short description of the file (name, kind, tokens, metadata).
    pub subject: String,
    /// Leading part of the file's text content.
    pub excerpt: String,
}

impl InferenceRequest {
    /// Create a new request.
    pub fn new(subject: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            excerpt: excerpt.into(),
        }
    }

    fn combined(&self) -> String {
        if self.excerpt.is_empty() {
            self.subject.clone()
        } else {
            format!("{}\n{}", self.subject, self.excerpt)
        }
    }
}

/// Output of an inference call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceResponse {
    /// Labels (type names for classify, keywords for tag).
    pub labels: Vec<String>,
    /// Dense vector (embed only).
    pub vector: Option<Vec<f32>>,
    /// Provider confidence in [0, 1].
    pub confidence: f64,
}

/// Synchronous inference backend.
pub trait InferenceProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Suggest project type labels.
    fn classify(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError>;

    /// Produce a dense embedding.
    fn embed(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError>;

    /// Suggest keywords.
    fn tag(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError>;

    /// Dispatch by task.
    fn infer(
        &self,
        task: InferenceTask,
        request: &InferenceRequest,
    ) -> Result<InferenceResponse, ProviderError> {
        match task {
            InferenceTask::Classify => self.classify(request),
            InferenceTask::Embed => self.embed(request),
            InferenceTask::Tag => self.tag(request),
        }
    }
}

/// Offline provider working from the request text alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalProvider;

impl LocalProvider {
    fn words(request: &InferenceRequest) -> Vec<String> {
        split_name(&request.combined())
            .into_iter()
            .filter(|w| w.len() >= 3 && w.chars().all(char::is_alphabetic))
            .collect()
    }
}

impl InferenceProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn classify(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let words = Self::words(request);
        let mut hits: BTreeMap<ProjectType, usize> = BTreeMap::new();
        for (project_type, indicators) in TYPE_INDICATORS {
            let count = words
                .iter()
                .filter(|w| indicators.contains(&w.as_str()))
                .count();
            if count > 0 {
                hits.insert(*project_type, count);
            }
        }
        let total: usize = hits.values().sum();
        let best = hits
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(t, c)| (*t, *c));

        Ok(match best {
            Some((project_type, count)) => InferenceResponse {
                labels: vec![project_type.to_string()],
                vector: None,
                confidence: count as f64 / total as f64,
            },
            None => InferenceResponse::default(),
        })
    }

    fn embed(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let mut vector = vec![0f32; LOCAL_DIMENSIONS];
        for word in Self::words(request) {
            let hash = blake3::hash(word.as_bytes());
            let bytes = hash.as_bytes();
            let index = usize::from(u16::from_le_bytes([bytes[0], bytes[1]])) % LOCAL_DIMENSIONS;
            let sign = if bytes[2] & 1 == 0 { 1.0 } else { -1.0 };
            vector[index] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(InferenceResponse {
            labels: Vec::new(),
            vector: (norm > 0.0).then_some(vector),
            confidence: 1.0,
        })
    }

    fn tag(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let words = Self::words(request).join(" ");
        let terms = content_terms(&words, MAX_TAGS);
        Ok(InferenceResponse {
            labels: terms.into_keys().collect(),
            vector: None,
            confidence: 0.5,
        })
    }
}

/// Provider speaking an OpenAI-compatible `embeddings` and
/// `chat/completions` API.
pub struct HttpProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    embed_model: String,
    classify_model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpProvider {
    /// Build a provider from configuration. The bearer key is read from the
    /// environment variable named in the configuration.
    ///
    /// Must not be called from inside an async runtime.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ProviderError::NotConfigured {
                message: format!("environment variable {} is not set", config.api_key_env),
            }
        })?;
        Self::new(config, api_key)
    }

    /// Build a provider with an explicit key.
    pub fn new(config: &ProviderConfig, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| ProviderError::NotConfigured {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embed_model: config.embed_model.clone(),
            classify_model: config.classify_model.clone(),
            api_key: api_key.into(),
        })
    }

    fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|e| ProviderError::Unavailable {
                message: format!("{path} request failed: {e}"),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ProviderError::Unavailable {
                message: format!("{path} returned {}: {body}", status.as_u16()),
            });
        }
        resp.json::<T>().map_err(|e| ProviderError::InvalidResponse {
            message: format!("{path}: {e}"),
        })
    }

    fn chat(&self, system: &str, request: &InferenceRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.classify_model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": request.combined() },
            ],
            "temperature": 0,
            "max_tokens": 32,
        });
        let response: ChatResponse = self.post("chat/completions", &body)?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "chat/completions returned no choices".to_string(),
            })
    }
}

impl InferenceProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn classify(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let labels = ProjectType::iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let system = format!(
            "Classify the file into one project type. Answer with exactly one word from: {labels}."
        );
        let answer = self.chat(&system, request)?.to_lowercase();
        let label = split_name(&answer)
            .into_iter()
            .find_map(|w| w.parse::<ProjectType>().ok())
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: format!("unrecognized label '{}'", answer.trim()),
            })?;
        Ok(InferenceResponse {
            labels: vec![label.to_string()],
            vector: None,
            confidence: 0.8,
        })
    }

    fn embed(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let mut body = json!({
            "model": self.embed_model,
            "input": [request.combined()],
        });
        // e5 models require the passage/query distinction.
        if self.embed_model.contains("e5") {
            body["input_type"] = json!("passage");
        }
        let response: EmbeddingResponse = self.post("embeddings", &body)?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "embeddings returned no vector".to_string(),
            })?;
        Ok(InferenceResponse {
            labels: Vec::new(),
            vector: Some(vector),
            confidence: 1.0,
        })
    }

    fn tag(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let system = format!(
            "List up to {MAX_TAGS} lowercase single-word keywords describing the file, comma separated."
        );
        let answer = self.chat(&system, request)?;
        let labels: Vec<String> = answer
            .split(',')
            .map(|t| t.trim().to_lowercase())
            .filter(|t| t.len() >= 3 && t.chars().all(char::is_alphabetic))
            .take(MAX_TAGS)
            .collect();
        Ok(InferenceResponse {
            labels,
            vector: None,
            confidence: 0.6,
        })
    }
}

/// Response of the fallback combinator, with the primary's error if the
/// local provider had to answer.
#[derive(Debug)]
pub struct Fallback {
    pub response: InferenceResponse,
    pub primary_error: Option<ProviderError>,
}

/// Tries the primary provider and falls back to [`LocalProvider`].
///
/// After repeated consecutive failures the primary is skipped for the rest
/// of the run; every skipped call still reports ProviderUnavailable.
pub struct FallbackProvider {
    primary: Option<Box<dyn InferenceProvider>>,
    local: LocalProvider,
    failures: AtomicUsize,
}

impl FallbackProvider {
    /// Combinator with a remote primary.
    pub fn new(primary: Box<dyn InferenceProvider>) -> Self {
        Self {
            primary: Some(primary),
            local: LocalProvider,
            failures: AtomicUsize::new(0),
        }
    }

    /// Combinator that only answers locally.
    pub fn local_only() -> Self {
        Self {
            primary: None,
            local: LocalProvider,
            failures: AtomicUsize::new(0),
        }
    }

    /// Build from configuration. A disabled or unconfigured remote provider
    /// yields a local-only combinator.
    pub fn from_config(config: &ProviderConfig) -> Self {
        if !config.enabled {
            return Self::local_only();
        }
        match HttpProvider::from_config(config) {
            Ok(http) => Self::new(Box::new(http)),
            Err(e) => {
                warn!(error = %e, "inference provider unavailable, using local features only");
                Self::local_only()
            }
        }
    }

    /// Whether a remote provider is configured.
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Run a task, falling back to the local provider on failure.
    pub fn run(&self, task: InferenceTask, request: &InferenceRequest) -> Fallback {
        let primary_error = match &self.primary {
            None => None,
            Some(_) if self.failures.load(Ordering::Relaxed) >= MAX_CONSECUTIVE_FAILURES => {
                Some(ProviderError::Unavailable {
                    message: "skipped after repeated failures".to_string(),
                })
            }
            Some(primary) => match primary.infer(task, request) {
                Ok(response) => {
                    self.failures.store(0, Ordering::Relaxed);
                    return Fallback {
                        response,
                        primary_error: None,
                    };
                }
                Err(e) => {
                    let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures == MAX_CONSECUTIVE_FAILURES {
                        warn!(provider = primary.name(), error = %e, "disabling provider after repeated failures");
                    } else {
                        debug!(provider = primary.name(), %task, error = %e, "provider failed, answering locally");
                    }
                    Some(e)
                }
            },
        };

        let response = self.local.infer(task, request).unwrap_or_default();
        Fallback {
            response,
            primary_error,
        }
    }

    pub fn classify_with_fallback(&self, request: &InferenceRequest) -> Fallback {
        self.run(InferenceTask::Classify, request)
    }

    pub fn embed_with_fallback(&self, request: &InferenceRequest) -> Fallback {
        self.run(InferenceTask::Embed, request)
    }

    pub fn tag_with_fallback(&self, request: &InferenceRequest) -> Fallback {
        self.run(InferenceTask::Tag, request)
    }
}

impl InferenceProvider for FallbackProvider {
    fn name(&self) -> &str {
        "fallback"
    }

    fn classify(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        Ok(self.classify_with_fallback(request).response)
    }

    fn embed(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        Ok(self.embed_with_fallback(request).response)
    }

    fn tag(&self, request: &InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        Ok(self.tag_with_fallback(request).response)
    }
}
