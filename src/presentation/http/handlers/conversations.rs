//! Conversation Handlers
//!
//! Direct messages between two users, optionally tied to a project.
//! New messages are also pushed over the realtime gateway.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    MessageHistoryQuery, SendMessageRequest, StartConversationRequest,
};
use crate::application::dto::response::{
    ConversationResponse, ConversationSummaryResponse, MessageResponse, UpdatedResponse,
};
use crate::application::services::MessagingService;
use crate::application::Actor;
use crate::presentation::http::extractors::ValidatedJson;
use crate::shared::error::AppError;
use crate::shared::snowflake::parse_id;
use crate::startup::AppState;

/// `GET /conversations`
pub async fn list_conversations(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<Json<Vec<ConversationSummaryResponse>>, AppError> {
    let conversations = state.messaging_service().list_conversations(actor).await?;
    Ok(Json(conversations.into_iter().map(Into::into).collect()))
}

/// `POST /conversations`
pub async fn start_conversation(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(body): ValidatedJson<StartConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), AppError> {
    let participant_id = parse_id(&body.participant_id, "participant")?;
    let project_id = body
        .project_id
        .as_deref()
        .map(|id| parse_id(id, "project"))
        .transpose()?;

    let conversation = state
        .messaging_service()
        .start_conversation(actor, participant_id, project_id, body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(conversation.into())))
}

/// `GET /conversations/{id}/messages?before=&limit=`
pub async fn list_messages(
    State(state): State<AppState>,
    actor: Actor,
    Path(conversation_id): Path<String>,
    Query(query): Query<MessageHistoryQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let before = query
        .before
        .as_deref()
        .map(|id| parse_id(id, "message"))
        .transpose()?;

    let messages = state
        .messaging_service()
        .list_messages(actor, conversation_id, before, query.limit)
        .await?;
    Ok(Json(messages.into_iter().map(Into::into).collect()))
}

/// `POST /conversations/{id}/messages`
pub async fn send_message(
    State(state): State<AppState>,
    actor: Actor,
    Path(conversation_id): Path<String>,
    ValidatedJson(body): ValidatedJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let message = state
        .messaging_service()
        .send_message(actor, conversation_id, body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

/// `POST /conversations/{id}/read`
pub async fn mark_read(
    State(state): State<AppState>,
    actor: Actor,
    Path(conversation_id): Path<String>,
) -> Result<Json<UpdatedResponse>, AppError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;
    let updated = state
        .messaging_service()
        .mark_read(actor, conversation_id)
        .await?;
    Ok(Json(UpdatedResponse { updated }))
}
