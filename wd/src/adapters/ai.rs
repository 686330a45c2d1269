//! AI provider capability - opaque to the core

use async_trait::async_trait;
use serde_json::Value;

/// Chat-completion capability; the core never inspects the model
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat(&self, prompt: &str, options: &Value) -> eyre::Result<String>;
}

pub mod mock {
    //! Scripted AI provider for tests

    use super::*;
    use tokio::sync::Mutex;

    /// Replies with canned responses in order, then echoes the prompt
    pub struct MockAiProvider {
        pub prompts: Mutex<Vec<String>>,
        responses: Mutex<Vec<String>>,
    }

    impl MockAiProvider {
        pub fn new(responses: Vec<String>) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            }
        }

        pub fn echoing() -> Self {
            Self::new(Vec::new())
        }
    }

    #[async_trait]
    impl AiProvider for MockAiProvider {
        async fn chat(&self, prompt: &str, _options: &Value) -> eyre::Result<String> {
            self.prompts.lock().await.push(prompt.to_string());
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                Ok(format!("echo: {prompt}"))
            } else {
                Ok(responses.remove(0))
            }
        }
    }
}
