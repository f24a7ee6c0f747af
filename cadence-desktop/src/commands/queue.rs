use cadence_core::CadenceError;
use cadence_core::queue::{MoveDirection, QueueItem};
use serde::Deserialize;

use crate::app::AppContext;

type CommandResult<T> = Result<T, CadenceError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQueueArgs {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueArgs {
    pub session_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItemArgs {
    pub session_id: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQueueItemArgs {
    pub session_id: String,
    pub item_id: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveQueueItemArgs {
    pub session_id: String,
    pub item_id: String,
    pub direction: MoveDirection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQueueItemsArgs {
    pub session_id: String,
    pub first_id: String,
    pub second_id: String,
}

/// Pending items in send order.
pub async fn list_queue(ctx: &AppContext, args: ListQueueArgs) -> CommandResult<Vec<QueueItem>> {
    ctx.queue_service.list(&args.session_id).await
}

pub async fn enqueue(ctx: &AppContext, args: EnqueueArgs) -> CommandResult<QueueItem> {
    ctx.queue_service
        .enqueue(&args.session_id, &args.content)
        .await
}

/// Edits a pending item. Returns `false` if it was already sent or removed.
pub async fn update_queue_item(ctx: &AppContext, args: UpdateQueueItemArgs) -> CommandResult<bool> {
    let affected = ctx
        .queue_service
        .update(&args.session_id, &args.item_id, &args.content)
        .await?;
    Ok(affected > 0)
}

pub async fn delete_queue_item(ctx: &AppContext, args: QueueItemArgs) -> CommandResult<bool> {
    let affected = ctx
        .queue_service
        .delete(&args.session_id, &args.item_id)
        .await?;
    Ok(affected > 0)
}

pub async fn move_queue_item(ctx: &AppContext, args: MoveQueueItemArgs) -> CommandResult<bool> {
    ctx.queue_service
        .move_item(&args.session_id, &args.item_id, args.direction)
        .await
}

pub async fn swap_queue_items(ctx: &AppContext, args: SwapQueueItemsArgs) -> CommandResult<()> {
    ctx.queue_service
        .swap_order(&args.session_id, &args.first_id, &args.second_id)
        .await
}

/// Drops every pending item. Returns how many were cleared.
pub async fn clear_queue(ctx: &AppContext, args: ListQueueArgs) -> CommandResult<usize> {
    ctx.queue_service.clear(&args.session_id).await
}
