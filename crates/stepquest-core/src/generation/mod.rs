//! Text generation collaborators.
//!
//! Mission and reward text come from a prompt-in, text-out service. The core
//! treats whatever comes back as untrusted and parses it defensively.

pub mod http;

pub use http::HttpTextGenerator;

use std::sync::Arc;

use crate::error::GenerationError;
use crate::storage::GeneratorConfig;

pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Always answers with empty text, so callers fall back to built-in content.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Ok(String::new())
    }
}

impl<T: TextGenerator + ?Sized> TextGenerator for Arc<T> {
    fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        (**self).generate(prompt)
    }
}

/// Build the generator described by `[generator]`.
///
/// An empty endpoint yields the offline generator. The API key is read from
/// the configured environment variable; a missing key sends no
/// authorization header.
pub fn from_config(config: &GeneratorConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    if config.is_offline() {
        tracing::debug!("text generation offline");
        return Ok(Arc::new(OfflineGenerator));
    }
    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());
    let generator = HttpTextGenerator::new(
        config.endpoint.trim(),
        api_key,
        std::time::Duration::from_secs(config.timeout_secs),
    )?;
    Ok(Arc::new(generator))
}
