use cadence_application::SendOutcome;
use cadence_application::session::SessionSnapshot;
use cadence_core::CadenceError;
use cadence_core::queue::QueueItem;
use cadence_core::session::{ConversationMessage, Session};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;

type CommandResult<T> = Result<T, CadenceError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenSessionArgs {
    pub working_directory: Option<String>,
    pub api_profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionArgs {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameSessionArgs {
    pub session_id: String,
    pub title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageArgs {
    pub session_id: String,
    pub content: String,
}

/// Everything the UI needs to redraw a session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredSession {
    pub session: Session,
    pub queue: Vec<QueueItem>,
    pub messages: Vec<ConversationMessage>,
}

async fn stored_session(ctx: &AppContext, session_id: &str) -> CommandResult<Session> {
    ctx.conversations
        .find_by_id(session_id)
        .await?
        .ok_or_else(|| CadenceError::not_found("Session", session_id))
}

/// Creates a conversation and starts its agent.
pub async fn open_session(ctx: &AppContext, args: OpenSessionArgs) -> CommandResult<Session> {
    let session = ctx
        .session_manager
        .open(args.working_directory, args.api_profile_id)
        .await?;
    stored_session(ctx, session.session_id()).await
}

/// Restarts the agent for a stored conversation and returns its state.
pub async fn restore_session(ctx: &AppContext, args: SessionArgs) -> CommandResult<RestoredSession> {
    ctx.session_manager.restore(&args.session_id).await?;
    Ok(RestoredSession {
        session: stored_session(ctx, &args.session_id).await?,
        queue: ctx.queue_service.list(&args.session_id).await?,
        messages: ctx.session_manager.messages(&args.session_id).await?,
    })
}

pub async fn list_sessions(ctx: &AppContext) -> CommandResult<Vec<Session>> {
    ctx.session_manager.list().await
}

pub async fn close_session(ctx: &AppContext, args: SessionArgs) -> CommandResult<()> {
    ctx.session_manager.close(&args.session_id).await
}

pub async fn delete_session(ctx: &AppContext, args: SessionArgs) -> CommandResult<()> {
    ctx.session_manager.delete(&args.session_id).await
}

pub async fn rename_session(ctx: &AppContext, args: RenameSessionArgs) -> CommandResult<()> {
    ctx.session_manager
        .rename(&args.session_id, &args.title)
        .await
}

/// Sends now if the session is idle, otherwise queues.
pub async fn send_message(ctx: &AppContext, args: SendMessageArgs) -> CommandResult<SendOutcome> {
    ctx.session_manager
        .require(&args.session_id)
        .await?
        .send_message(&args.content)
        .await
}

pub async fn interrupt(ctx: &AppContext, args: SessionArgs) -> CommandResult<bool> {
    ctx.session_manager
        .require(&args.session_id)
        .await?
        .interrupt()
        .await
}

pub async fn compact(ctx: &AppContext, args: SessionArgs) -> CommandResult<()> {
    ctx.session_manager
        .require(&args.session_id)
        .await?
        .compact()
        .await
}

pub async fn send_queue_now(ctx: &AppContext, args: SessionArgs) -> CommandResult<usize> {
    ctx.session_manager
        .require(&args.session_id)
        .await?
        .send_queue_now()
        .await
}

pub async fn list_messages(
    ctx: &AppContext,
    args: SessionArgs,
) -> CommandResult<Vec<ConversationMessage>> {
    ctx.session_manager.messages(&args.session_id).await
}

/// Raw protocol records of a live session, one JSON object per line.
pub async fn export_history(ctx: &AppContext, args: SessionArgs) -> CommandResult<String> {
    ctx.session_manager
        .require(&args.session_id)
        .await?
        .export_history()
        .await
}

pub async fn session_stats(ctx: &AppContext, args: SessionArgs) -> CommandResult<SessionSnapshot> {
    Ok(ctx
        .session_manager
        .require(&args.session_id)
        .await?
        .snapshot()
        .await)
}
