// Deterministic embedders for unit tests

use std::collections::HashMap;
use std::sync::Mutex;

use crate::embeddings::{Embedder, Generator};
use crate::{DocsError, Result};

/// Bag-of-words embedder: every lowercase alphanumeric token adds one to
/// the bucket its FNV-1a hash lands in.
pub(crate) struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = fnv1a(&token.to_lowercase()) % self.dimension as u64;
            vector[bucket as usize] += 1.0;
        }
        Ok(vector)
    }
}

fn fnv1a(token: &str) -> u64 {
    token.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Returns a fixed vector per known text and fails on anything else
pub(crate) struct TableEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    pub(crate) fn new(dimension: usize, entries: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            dimension,
            table: entries
                .into_iter()
                .map(|(text, vector)| (text.to_string(), vector))
                .collect(),
        }
    }
}

impl Embedder for TableEmbedder {
    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| DocsError::Embedding(format!("no vector for {:?}", text)))
    }
}

/// Records every prompt and answers with a canned reply
pub(crate) struct EchoGenerator {
    reply: String,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl EchoGenerator {
    pub(crate) fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok()?.last().cloned()
    }
}

impl Generator for EchoGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        Ok(self.reply.clone())
    }
}
