pub mod queue;
pub mod session;

use cadence_core::{CadenceError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::app::AppContext;

fn args<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| CadenceError::invalid_input(format!("Invalid arguments: {}", e)))
}

fn reply<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Routes one bridge request to its handler.
pub async fn dispatch(ctx: &AppContext, command: &str, params: Value) -> Result<Value> {
    match command {
        "open_session" => {
            let params = if params.is_null() {
                session::OpenSessionArgs::default()
            } else {
                args(params)?
            };
            reply(session::open_session(ctx, params).await?)
        }
        "restore_session" => reply(session::restore_session(ctx, args(params)?).await?),
        "list_sessions" => reply(session::list_sessions(ctx).await?),
        "close_session" => reply(session::close_session(ctx, args(params)?).await?),
        "delete_session" => reply(session::delete_session(ctx, args(params)?).await?),
        "rename_session" => reply(session::rename_session(ctx, args(params)?).await?),
        "send_message" => reply(session::send_message(ctx, args(params)?).await?),
        "interrupt" => reply(session::interrupt(ctx, args(params)?).await?),
        "compact" => reply(session::compact(ctx, args(params)?).await?),
        "send_queue_now" => reply(session::send_queue_now(ctx, args(params)?).await?),
        "list_messages" => reply(session::list_messages(ctx, args(params)?).await?),
        "export_history" => reply(session::export_history(ctx, args(params)?).await?),
        "session_stats" => reply(session::session_stats(ctx, args(params)?).await?),
        "list_queue" => reply(queue::list_queue(ctx, args(params)?).await?),
        "enqueue" => reply(queue::enqueue(ctx, args(params)?).await?),
        "update_queue_item" => reply(queue::update_queue_item(ctx, args(params)?).await?),
        "delete_queue_item" => reply(queue::delete_queue_item(ctx, args(params)?).await?),
        "move_queue_item" => reply(queue::move_queue_item(ctx, args(params)?).await?),
        "swap_queue_items" => reply(queue::swap_queue_items(ctx, args(params)?).await?),
        "clear_queue" => reply(queue::clear_queue(ctx, args(params)?).await?),
        other => Err(CadenceError::invalid_input(format!(
            "Unknown command: {}",
            other
        ))),
    }
}
