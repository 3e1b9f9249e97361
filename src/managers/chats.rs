use super::{require_text, StoreContext};
use crate::errors::{AppError, AppResult};
use crate::models::{ChatMessage, ChatRole, ChatSession, ExtraFields, RecordId};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const CHATS_FOLDER: &str = "chats";
pub const PLACEHOLDER_TITLE: &str = "New Chat";
const MAX_TITLE_CHARS: usize = 48;
const MAX_TITLE_WORDS: usize = 7;

pub type TitleFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>;

/// Produces a short session title from the first exchange. Implementations may
/// call out to a model; failures are tolerated by the caller.
pub trait TitleGenerator: Send + Sync {
    fn generate(&self, user_message: String, assistant_reply: String) -> TitleFuture;
}

/// Local fallback: the first few words of the opening user message.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTitler;

impl HeuristicTitler {
    pub fn title_for(message: &str) -> Option<String> {
        let line = message.lines().map(str::trim).find(|line| !line.is_empty())?;
        let mut title = String::new();
        for word in line.split_whitespace().take(MAX_TITLE_WORDS) {
            if title.chars().count() + word.chars().count() + 1 > MAX_TITLE_CHARS {
                break;
            }
            if !title.is_empty() {
                title.push(' ');
            }
            title.push_str(word);
        }
        if title.is_empty() {
            title = line.chars().take(MAX_TITLE_CHARS).collect();
        }
        let title = title.trim_end_matches(|c: char| c.is_ascii_punctuation()).to_string();
        if title.is_empty() {
            None
        } else {
            Some(title)
        }
    }
}

impl TitleGenerator for HeuristicTitler {
    fn generate(&self, user_message: String, _assistant_reply: String) -> TitleFuture {
        Box::pin(async move {
            HeuristicTitler::title_for(&user_message)
                .ok_or_else(|| anyhow::anyhow!("first message has no usable text for a title"))
        })
    }
}

#[derive(Clone)]
pub struct ChatManager {
    ctx: StoreContext,
    titler: Arc<dyn TitleGenerator>,
}

impl ChatManager {
    pub fn new(ctx: StoreContext, titler: Arc<dyn TitleGenerator>) -> Self {
        Self { ctx, titler }
    }

    pub fn list(&self) -> AppResult<Vec<ChatSession>> {
        self.ctx.collections.list(CHATS_FOLDER)
    }

    pub fn get(&self, session_id: RecordId) -> AppResult<ChatSession> {
        self.ctx.load_item(CHATS_FOLDER, session_id)
    }

    pub async fn create(&self, model: &str) -> AppResult<ChatSession> {
        let session = self
            .ctx
            .create_item(CHATS_FOLDER, |id| {
                let now = Utc::now();
                Ok(ChatSession {
                    id,
                    title: PLACEHOLDER_TITLE.to_string(),
                    model: model.trim().to_string(),
                    messages: Vec::new(),
                    created_at: Some(now),
                    updated_at: Some(now),
                    extra: ExtraFields::new(),
                })
            })
            .await?;
        tracing::info!(session_id = session.id, model = %session.model, "chat session created");
        Ok(session)
    }

    pub async fn append_message(&self, session_id: RecordId, message: ChatMessage) -> AppResult<ChatSession> {
        if message.content.trim().is_empty() && message.role != ChatRole::Assistant {
            return Err(AppError::Validation("Message content cannot be empty".to_string()));
        }
        self.ctx
            .mutate_item(CHATS_FOLDER, session_id, |session: &mut ChatSession| {
                session.messages.push(message);
                session.updated_at = Some(Utc::now());
                Ok(session.clone())
            })
            .await
    }

    /// Persists a user message and the assistant's reply together. The first
    /// exchange of a session still carrying the placeholder title starts a
    /// background rename; the save itself never waits for it.
    pub async fn record_exchange(
        &self,
        session_id: RecordId,
        user_message: String,
        assistant_reply: String,
        reasoning: Option<String>,
    ) -> AppResult<ChatSession> {
        let (session, _job) = self
            .record_exchange_tracked(session_id, user_message, assistant_reply, reasoning)
            .await?;
        Ok(session)
    }

    pub(crate) async fn record_exchange_tracked(
        &self,
        session_id: RecordId,
        user_message: String,
        assistant_reply: String,
        reasoning: Option<String>,
    ) -> AppResult<(ChatSession, Option<JoinHandle<()>>)> {
        require_text(&user_message, "Message content")?;
        let user = ChatMessage::new(ChatRole::User, user_message.clone());
        let mut reply = ChatMessage::new(ChatRole::Assistant, assistant_reply.clone());
        reply.reasoning = reasoning;

        let session = self
            .ctx
            .mutate_item(CHATS_FOLDER, session_id, |session: &mut ChatSession| {
                session.messages.push(user);
                session.messages.push(reply);
                session.updated_at = Some(Utc::now());
                Ok(session.clone())
            })
            .await?;

        let user_turns = session.messages.iter().filter(|m| m.role == ChatRole::User).count();
        let job = if user_turns == 1 && session.title == PLACEHOLDER_TITLE {
            Some(self.spawn_title_job(session_id, user_message, assistant_reply))
        } else {
            None
        };
        Ok((session, job))
    }

    fn spawn_title_job(&self, session_id: RecordId, user_message: String, assistant_reply: String) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let title = match manager.titler.generate(user_message, assistant_reply).await {
                Ok(title) => title,
                Err(error) => {
                    tracing::warn!(session_id, error = %error, "title generation failed");
                    return;
                }
            };
            match manager.rename_if_placeholder(session_id, &title).await {
                Ok(true) => tracing::info!(session_id, title = %title, "chat session titled"),
                Ok(false) => tracing::debug!(session_id, "chat session already renamed"),
                Err(error) => tracing::warn!(session_id, error = %error, "applying generated title failed"),
            }
        })
    }

    /// Only replaces the placeholder, so a manual rename made meanwhile wins.
    pub async fn rename_if_placeholder(&self, session_id: RecordId, title: &str) -> AppResult<bool> {
        let title = require_text(title, "Chat title")?;
        self.ctx
            .mutate_item(CHATS_FOLDER, session_id, |session: &mut ChatSession| {
                if session.title != PLACEHOLDER_TITLE {
                    return Ok(false);
                }
                session.title = title;
                Ok(true)
            })
            .await
    }

    pub async fn rename(&self, session_id: RecordId, title: &str) -> AppResult<ChatSession> {
        let title = require_text(title, "Chat title")?;
        self.ctx
            .mutate_item(CHATS_FOLDER, session_id, |session: &mut ChatSession| {
                session.title = title;
                session.updated_at = Some(Utc::now());
                Ok(session.clone())
            })
            .await
    }

    pub async fn delete(&self, session_id: RecordId) -> AppResult<()> {
        self.ctx.remove_item(CHATS_FOLDER, session_id).await
    }
}
