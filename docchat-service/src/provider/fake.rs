//! In-process providers and a loopback HTTP server for tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use tokio::sync::Semaphore;

use super::{ChatModel, EmbeddingProvider, Providers};
use crate::error::ProviderError;

const DIMENSIONS: usize = 64;

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Bag-of-words hashing embedder: texts sharing words get similar vectors.
#[derive(Default)]
pub(crate) struct FakeEmbedder {
    fail: AtomicBool,
    batches: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl FakeEmbedder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Document embedding waits for a permit on the returned semaphore.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(gate.clone()),
                ..Self::default()
            },
            gate,
        )
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub(crate) fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 503,
                message: "embedding service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    fn model_name(&self) -> &str {
        "fake-embed"
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.check()?;
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.check()?;
        Ok(Self::vector(text))
    }
}

/// Chat model that answers with a fixed reply and records the prompts it saw.
pub(crate) struct FakeChatModel {
    reply: Mutex<String>,
    fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl FakeChatModel {
    pub(crate) fn new(reply: &str) -> Self {
        Self {
            reply: Mutex::new(reply.to_string()),
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn set_reply(&self, reply: &str) {
        *self.reply.lock().unwrap() = reply.to_string();
    }

    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for FakeChatModel {
    fn model_name(&self) -> &str {
        "fake-chat"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                status: 500,
                message: "model exploded".to_string(),
            });
        }
        Ok(self.reply.lock().unwrap().clone())
    }

    async fn health_check(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}

/// Fake providers plus handles to steer them.
pub(crate) struct FakeProviders {
    pub embedder: Arc<FakeEmbedder>,
    pub chat: Arc<FakeChatModel>,
}

impl FakeProviders {
    pub(crate) fn new() -> Self {
        Self::with_embedder(FakeEmbedder::new())
    }

    pub(crate) fn with_embedder(embedder: FakeEmbedder) -> Self {
        Self {
            embedder: Arc::new(embedder),
            chat: Arc::new(FakeChatModel::new("The document is about lighthouses.")),
        }
    }

    pub(crate) fn providers(&self) -> Providers {
        Providers {
            embeddings: self.embedder.clone(),
            chat: self.chat.clone(),
        }
    }
}
