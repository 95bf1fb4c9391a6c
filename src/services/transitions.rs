//! User-requested content status changes

use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::error::LifecycleError;
use crate::domain::audit::{self, AuditEvent, EntityType};
use crate::domain::transitions::{can_transition, valid_transitions};
use crate::domain::{Actor, ContentItem, ContentStatus, Role};
use crate::store::{DataStore, record_audit};

#[derive(Clone)]
pub struct TransitionService {
    store: Arc<dyn DataStore>,
}

impl TransitionService {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Move an item to `to` on behalf of `actor`.
    ///
    /// The edge is checked against the transition table and then applied as a
    /// compare-and-set on the status that was read. If another writer changed
    /// the status in between, the request is re-judged against the new status.
    pub async fn request_transition(
        &self,
        item_id: i64,
        to: ContentStatus,
        actor: &Actor,
    ) -> Result<ContentItem, LifecycleError> {
        let mut item = self.load(item_id).await?;

        loop {
            let from = item.status;
            if !can_transition(from, to, actor.role) {
                tracing::info!(
                    item_id,
                    %from,
                    %to,
                    role = %actor.role,
                    "transition rejected"
                );
                return Err(LifecycleError::TransitionRejected {
                    from,
                    to,
                    valid_targets: valid_transitions(from, actor.role),
                });
            }

            if self.store.compare_and_set_status(item_id, from, to).await? {
                record_audit(
                    self.store.as_ref(),
                    AuditEvent::new(
                        EntityType::ContentItem,
                        item_id,
                        audit::STATUS_CHANGED,
                        actor.label(),
                        Some(actor.role),
                        json!({ "from": from, "to": to }),
                    ),
                )
                .await;

                tracing::info!(item_id, %from, %to, actor = %actor.label(), "status changed");
                return self.load(item_id).await;
            }

            item = self.load(item_id).await?;
        }
    }

    /// Statuses `role` may move the item to from where it is now
    pub async fn valid_targets(
        &self,
        item_id: i64,
        role: Role,
    ) -> Result<(ContentStatus, BTreeSet<ContentStatus>), LifecycleError> {
        let item = self.load(item_id).await?;
        Ok((item.status, valid_transitions(item.status, role)))
    }

    async fn load(&self, item_id: i64) -> Result<ContentItem, LifecycleError> {
        self.store
            .get_content_item(item_id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "content item",
                id: item_id,
            })
    }
}
