use async_trait::async_trait;

use crate::errors::DeskPilotResult;

/// Image attached to a vision call.
#[derive(Debug, Clone)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// A single oracle call. Text calls leave `image` empty.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub image: Option<ImageAttachment>,
    pub max_tokens: u32,
}

impl OracleRequest {
    pub fn text(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            image: None,
            max_tokens: 4096,
        }
    }

    pub fn vision(
        system_prompt: impl Into<String>,
        user_prompt: impl Into<String>,
        image: ImageAttachment,
    ) -> Self {
        Self {
            image: Some(image),
            ..Self::text(system_prompt, user_prompt)
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn is_vision(&self) -> bool {
        self.image.is_some()
    }
}

/// Language-model oracle: returns the model's reply text, or a transport error.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, request: OracleRequest) -> DeskPilotResult<String>;
}
