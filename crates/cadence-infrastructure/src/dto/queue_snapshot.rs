use cadence_core::queue::QueueItem;
use serde::{Deserialize, Serialize};

/// One entry of the `conversations.queued_messages` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessageDTO {
    pub id: String,
    pub content: String,
    #[serde(alias = "created_at")]
    pub created_at: i64,
}

/// The whole snapshot column: a JSON array in queue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueSnapshotDTO(pub Vec<QueuedMessageDTO>);

impl QueueSnapshotDTO {
    pub fn from_items(items: &[QueueItem]) -> Self {
        Self(
            items
                .iter()
                .map(|item| QueuedMessageDTO {
                    id: item.id.clone(),
                    content: item.content.clone(),
                    created_at: item.created_at,
                })
                .collect(),
        )
    }

    pub fn into_items(self, session_id: &str) -> Vec<QueueItem> {
        self.0
            .into_iter()
            .map(|dto| QueueItem {
                id: dto.id,
                session_id: session_id.to_string(),
                content: dto.content,
                executed: false,
                created_at: dto.created_at,
                executed_at: None,
            })
            .collect()
    }
}
