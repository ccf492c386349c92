//! Scripted providers and factories shared by the orchestration tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use std::sync::Arc;

use super::provider::{
    ChatMessage, Completion, CredentialStore, LlmProvider, ProviderCategory, ProviderDescriptor,
    ProviderFactory, SharedProvider, TokenUsage,
};
use crate::types::{ErrorKind, LlmError, PlanwrightError, Result};

type Reply = std::result::Result<String, LlmError>;

/// Provider that replays a fixed script of replies, then repeats the last one
pub struct ScriptedProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    last: Mutex<Option<Reply>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn ok(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn err(self, kind: ErrorKind, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(LlmError::with_provider(kind, message, self.name.clone())));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn send(
        &self,
        model: &str,
        _messages: &[ChatMessage],
        _token_ceiling: u32,
    ) -> std::result::Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut script = self.script.lock().unwrap();
            let mut last = self.last.lock().unwrap();
            match script.pop_front() {
                Some(reply) => {
                    *last = Some(reply.clone());
                    reply
                }
                None => last.clone().unwrap_or_else(|| {
                    Err(LlmError::new(ErrorKind::Unknown, "script is empty"))
                }),
            }
        };

        reply.map(|text| Completion {
            text,
            usage: TokenUsage::new(100, 50),
            model: model.to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory that hands out pre-built providers and counts creations
#[derive(Default)]
pub struct StaticFactory {
    providers: HashMap<String, SharedProvider>,
    creations: AtomicUsize,
    delay: Option<Duration>,
}

impl StaticFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: &str, provider: SharedProvider) -> Self {
        self.providers.insert(id.to_string(), provider);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderFactory for StaticFactory {
    async fn create(
        &self,
        descriptor: &ProviderDescriptor,
        _credentials: &CredentialStore,
    ) -> Result<SharedProvider> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.providers
            .get(&descriptor.id)
            .cloned()
            .ok_or_else(|| PlanwrightError::Config(format!("no test client for {}", descriptor.id)))
    }
}

/// Descriptor with no required credentials (always configured)
pub fn descriptor(id: &str, priority: u32) -> ProviderDescriptor {
    let mut models = BTreeMap::new();
    models.insert("small".to_string(), 16_000);
    models.insert("large".to_string(), 128_000);
    ProviderDescriptor {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        category: ProviderCategory::Cloud,
        credentials: Vec::new(),
        models,
        default_model: "small".to_string(),
        priority,
    }
}
