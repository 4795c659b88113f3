//! Scripted collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::llm::{Embedder, GenerationOptions, TextGenerator};

pub const DIMS: usize = 128;

/// First dimension handed out to unscripted text
const FREE_DIMENSION: usize = 16;

/// Embedder returning fixed vectors for known text. Unknown text gets a
/// one-hot vector in the upper dimensions, orthogonal to every scripted one.
#[derive(Default)]
pub struct ScriptedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    assigned: Mutex<HashMap<String, Vec<f32>>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `text` to embed as `head` padded with zeros
    pub fn with(mut self, text: &str, head: &[f32]) -> Self {
        assert!(head.len() <= FREE_DIMENSION);
        let mut vector = vec![0.0; DIMS];
        vector[..head.len()].copy_from_slice(head);
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Fail every embedding request for `text`
    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(text) {
            return Err(Error::EmbeddingFailed(format!("scripted failure for '{}'", text)));
        }
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }

        let mut assigned = self
            .assigned
            .lock()
            .map_err(|_| Error::Other("embedder lock poisoned".into()))?;
        let next = assigned.len();
        let vector = assigned.entry(text.to_string()).or_insert_with(|| {
            let mut v = vec![0.0; DIMS];
            v[FREE_DIMENSION + next % (DIMS - FREE_DIMENSION)] = 1.0;
            v
        });
        Ok(vector.clone())
    }
}

/// Generator answering from a user-prompt substring table
#[derive(Default)]
pub struct ScriptedGenerator {
    answers: Vec<(String, String)>,
    fallback: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn answering(fallback: &str) -> Self {
        Self {
            fallback: fallback.to_string(),
            ..Self::default()
        }
    }

    /// Reply `answer` whenever the user prompt contains `needle`
    pub fn when(mut self, needle: &str, answer: &str) -> Self {
        self.answers.push((needle.to_string(), answer.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        user_prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(user_prompt.to_string());
        }
        Ok(self
            .answers
            .iter()
            .find(|(needle, _)| user_prompt.contains(needle.as_str()))
            .map(|(_, answer)| answer.clone())
            .unwrap_or_else(|| self.fallback.clone()))
    }
}
