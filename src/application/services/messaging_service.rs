//! Messaging Service
//!
//! Two-party conversations with read receipts, pushed live over the
//! realtime gateway.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::events::{Notifier, RealtimeEvent};
use crate::application::Actor;
use crate::domain::{
    Conversation, ConversationRepository, ConversationSummary, Message, NotificationKind,
    ProjectRepository, UserRepository, MAX_MESSAGE_LENGTH,
};
use crate::shared::error::AppError;
use crate::shared::snowflake::SnowflakeGenerator;

pub const DEFAULT_MESSAGE_LIMIT: i64 = 50;
pub const MAX_MESSAGE_LIMIT: i64 = 100;

#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Find or create the conversation between the actor and `participant_id`
    /// about `project_id`, optionally sending a first message. A project
    /// reference requires one of the two to be its client or assigned
    /// freelancer.
    async fn start_conversation(
        &self,
        actor: Actor,
        participant_id: i64,
        project_id: Option<i64>,
        message: Option<String>,
    ) -> Result<Conversation, MessagingError>;

    async fn list_conversations(
        &self,
        actor: Actor,
    ) -> Result<Vec<ConversationSummary>, MessagingError>;

    async fn list_messages(
        &self,
        actor: Actor,
        conversation_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, MessagingError>;

    async fn send_message(
        &self,
        actor: Actor,
        conversation_id: i64,
        content: String,
    ) -> Result<Message, MessagingError>;

    async fn mark_read(&self, actor: Actor, conversation_id: i64) -> Result<u64, MessagingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Conversation not found")]
    NotFound,

    #[error("Recipient not found")]
    RecipientNotFound,

    #[error("You cannot message yourself")]
    SelfConversation,

    #[error("Project not found")]
    ProjectNotFound,

    #[error("Neither participant is part of this project")]
    UnrelatedProject,

    #[error("Message must be 1-{max} characters", max = MAX_MESSAGE_LENGTH)]
    InvalidContent,

    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::NotFound
            | MessagingError::RecipientNotFound
            | MessagingError::ProjectNotFound => AppError::NotFound(err.to_string()),
            MessagingError::UnrelatedProject => AppError::Forbidden(err.to_string()),
            MessagingError::SelfConversation | MessagingError::InvalidContent => {
                AppError::Validation(err.to_string())
            }
            MessagingError::Internal(inner) => inner,
        }
    }
}

fn check_content(content: &str) -> Result<String, MessagingError> {
    let trimmed = content.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(MessagingError::InvalidContent);
    }
    Ok(trimmed.to_string())
}

pub struct MessagingServiceImpl<C, U, P>
where
    C: ConversationRepository,
    U: UserRepository,
    P: ProjectRepository,
{
    conversation_repo: Arc<C>,
    user_repo: Arc<U>,
    project_repo: Arc<P>,
    notifier: Notifier,
    id_generator: Arc<SnowflakeGenerator>,
}

impl<C, U, P> MessagingServiceImpl<C, U, P>
where
    C: ConversationRepository,
    U: UserRepository,
    P: ProjectRepository,
{
    pub fn new(
        conversation_repo: Arc<C>,
        user_repo: Arc<U>,
        project_repo: Arc<P>,
        notifier: Notifier,
        id_generator: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            conversation_repo,
            user_repo,
            project_repo,
            notifier,
            id_generator,
        }
    }

    async fn check_project(
        &self,
        project_id: i64,
        first: i64,
        second: i64,
    ) -> Result<(), MessagingError> {
        let project = self
            .project_repo
            .find_by_id(project_id)
            .await?
            .ok_or(MessagingError::ProjectNotFound)?;
        if project.is_participant(first) || project.is_participant(second) {
            Ok(())
        } else {
            Err(MessagingError::UnrelatedProject)
        }
    }

    /// Non-participants get NotFound so conversation ids do not leak.
    async fn load_for(
        &self,
        actor: Actor,
        conversation_id: i64,
    ) -> Result<Conversation, MessagingError> {
        match self.conversation_repo.find_by_id(conversation_id).await? {
            Some(c) if c.is_participant(actor.user_id) => Ok(c),
            _ => Err(MessagingError::NotFound),
        }
    }

    async fn post(
        &self,
        actor: Actor,
        conversation: &Conversation,
        content: String,
    ) -> Result<Message, MessagingError> {
        let message = Message::new(
            self.id_generator.generate(),
            conversation.id,
            actor.user_id,
            content,
        );
        let stored = self.conversation_repo.add_message(&message).await?;

        self.notifier
            .push(
                vec![conversation.participant_a, conversation.participant_b],
                RealtimeEvent::MessageCreate(stored.clone()),
            )
            .await;
        if let Some(other) = conversation.other_participant(actor.user_id) {
            let preview: String = stored.content.chars().take(80).collect();
            self.notifier
                .notify(
                    other,
                    NotificationKind::NewMessage,
                    "New message",
                    preview,
                    Some(format!("/messages/{}", conversation.id)),
                )
                .await;
        }
        Ok(stored)
    }
}

#[async_trait]
impl<C, U, P> MessagingService for MessagingServiceImpl<C, U, P>
where
    C: ConversationRepository + 'static,
    U: UserRepository + 'static,
    P: ProjectRepository + 'static,
{
    async fn start_conversation(
        &self,
        actor: Actor,
        participant_id: i64,
        project_id: Option<i64>,
        message: Option<String>,
    ) -> Result<Conversation, MessagingError> {
        if participant_id == actor.user_id {
            return Err(MessagingError::SelfConversation);
        }
        let first = message.as_deref().map(check_content).transpose()?;

        if self.user_repo.find_by_id(participant_id).await?.is_none() {
            return Err(MessagingError::RecipientNotFound);
        }
        if let Some(project_id) = project_id {
            self.check_project(project_id, actor.user_id, participant_id)
                .await?;
        }

        let conversation = match self
            .conversation_repo
            .find_between(actor.user_id, participant_id, project_id)
            .await?
        {
            Some(existing) => existing,
            None => {
                let conversation = Conversation::new(
                    self.id_generator.generate(),
                    actor.user_id,
                    participant_id,
                    project_id,
                );
                self.conversation_repo.find_or_create(&conversation).await?
            }
        };

        if let Some(content) = first {
            self.post(actor, &conversation, content).await?;
        }
        Ok(conversation)
    }

    async fn list_conversations(
        &self,
        actor: Actor,
    ) -> Result<Vec<ConversationSummary>, MessagingError> {
        Ok(self.conversation_repo.list_for_user(actor.user_id).await?)
    }

    async fn list_messages(
        &self,
        actor: Actor,
        conversation_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, MessagingError> {
        self.load_for(actor, conversation_id).await?;
        let limit = limit
            .unwrap_or(DEFAULT_MESSAGE_LIMIT)
            .clamp(1, MAX_MESSAGE_LIMIT);
        Ok(self
            .conversation_repo
            .list_messages(conversation_id, before, limit)
            .await?)
    }

    async fn send_message(
        &self,
        actor: Actor,
        conversation_id: i64,
        content: String,
    ) -> Result<Message, MessagingError> {
        let content = check_content(&content)?;
        let conversation = self.load_for(actor, conversation_id).await?;
        self.post(actor, &conversation, content).await
    }

    async fn mark_read(&self, actor: Actor, conversation_id: i64) -> Result<u64, MessagingError> {
        self.load_for(actor, conversation_id).await?;
        Ok(self
            .conversation_repo
            .mark_read(conversation_id, actor.user_id)
            .await?)
    }
}
