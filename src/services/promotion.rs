//! Auto-promotion of content items from creative and approval signals
//!
//! Outputs completing and platform posts being approved are the only signals.
//! Each promotion hop is a single table edge, applied with a compare-and-set so
//! that concurrent evaluations of the same item advance it at most once.

use serde_json::json;
use std::sync::Arc;

use super::error::LifecycleError;
use crate::constants::REQUIRED_APPROVED_POSTS;
use crate::domain::audit::{self, AUTO_PROMOTION_ACTOR, AuditEvent, EntityType};
use crate::domain::transitions::can_transition;
use crate::domain::{ContentItem, ContentOutput, ContentStatus, NewContentOutput, OutputType, Role};
use crate::store::{DataStore, record_audit};

/// What the engine knows about an item when it evaluates it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionSignals {
    pub any_output_completed: bool,
    pub hero_image_completed: bool,
    pub infographic_completed: bool,
    pub approved_posts: i64,
}

impl PromotionSignals {
    pub fn from_outputs(outputs: &[ContentOutput]) -> Self {
        let completed = |kind: &OutputType| {
            outputs
                .iter()
                .any(|o| &o.output_type == kind && o.is_completed())
        };

        Self {
            any_output_completed: outputs.iter().any(ContentOutput::is_completed),
            hero_image_completed: completed(&OutputType::HeroImage),
            infographic_completed: completed(&OutputType::Infographic),
            approved_posts: 0,
        }
    }

    fn creative_ready(&self) -> bool {
        self.hero_image_completed && self.infographic_completed
    }

    pub fn ready_for_review(&self) -> bool {
        self.creative_ready() && self.approved_posts >= REQUIRED_APPROVED_POSTS
    }
}

/// Hops to attempt, in order, for an item at `status`
pub fn plan_hops(status: ContentStatus, signals: &PromotionSignals) -> Vec<(ContentStatus, ContentStatus)> {
    use ContentStatus::{Draft, Idea, Review};

    match status {
        Idea if signals.ready_for_review() => vec![(Idea, Draft), (Draft, Review)],
        Idea if signals.any_output_completed => vec![(Idea, Draft)],
        Draft if signals.ready_for_review() => vec![(Draft, Review)],
        _ => Vec::new(),
    }
}

#[derive(Clone)]
pub struct AutoPromotion {
    store: Arc<dyn DataStore>,
}

impl AutoPromotion {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    /// Evaluate one item and apply any promotion it qualifies for.
    ///
    /// Never fails: errors are logged and reported as no hops applied.
    pub async fn evaluate(&self, item_id: i64) -> Vec<(ContentStatus, ContentStatus)> {
        match self.try_evaluate(item_id).await {
            Ok(applied) => applied,
            Err(e) => {
                tracing::warn!(item_id, error = %e, "auto-promotion evaluation failed");
                Vec::new()
            }
        }
    }

    /// Re-evaluate every item linked to a product
    pub async fn evaluate_for_product(&self, product_id: i64) -> usize {
        let items = match self.store.content_items_for_product(product_id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(product_id, error = %e, "failed to list items for product");
                return 0;
            }
        };

        let mut promoted = 0;
        for item_id in items {
            if !self.evaluate(item_id).await.is_empty() {
                promoted += 1;
            }
        }
        promoted
    }

    /// Store a new output for an item, then evaluate the item
    pub async fn add_output(&self, output: NewContentOutput) -> Result<ContentOutput, LifecycleError> {
        let created = self.store.insert_output(output).await?;
        self.evaluate(created.content_item_id).await;
        Ok(created)
    }

    /// Mark a platform post approved, then evaluate every item of its product.
    /// Returns the product id.
    pub async fn approve_platform_post(&self, platform_post_id: i64) -> Result<i64, LifecycleError> {
        let product_id = self
            .store
            .approve_platform_post(platform_post_id)
            .await?
            .ok_or(LifecycleError::NotFound {
                entity: "platform post",
                id: platform_post_id,
            })?;

        let promoted = self.evaluate_for_product(product_id).await;
        tracing::info!(platform_post_id, product_id, promoted, "platform post approved");
        Ok(product_id)
    }

    async fn try_evaluate(
        &self,
        item_id: i64,
    ) -> Result<Vec<(ContentStatus, ContentStatus)>, LifecycleError> {
        let Some(item) = self.store.get_content_item(item_id).await? else {
            return Err(LifecycleError::NotFound {
                entity: "content item",
                id: item_id,
            });
        };

        if !matches!(item.status, ContentStatus::Idea | ContentStatus::Draft) {
            return Ok(Vec::new());
        }

        let outputs = self.store.list_outputs(item_id).await?;
        let mut signals = PromotionSignals::from_outputs(&outputs);
        if signals.creative_ready() {
            signals.approved_posts = self.approved_posts_for(&item).await?;
        }

        let mut applied = Vec::new();
        for (from, to) in plan_hops(item.status, &signals) {
            if !can_transition(from, to, Role::Staff) {
                break;
            }

            if !self.store.compare_and_set_status(item_id, from, to).await? {
                tracing::debug!(item_id, %from, %to, "item moved concurrently; stopping promotion");
                break;
            }

            record_audit(
                self.store.as_ref(),
                AuditEvent::new(
                    EntityType::ContentItem,
                    item_id,
                    audit::STATUS_AUTO_PROMOTED,
                    AUTO_PROMOTION_ACTOR,
                    None,
                    json!({
                        "from": from,
                        "to": to,
                        "approved_posts": signals.approved_posts,
                    }),
                ),
            )
            .await;

            tracing::info!(item_id, %from, %to, "item auto-promoted");
            applied.push((from, to));
        }

        Ok(applied)
    }

    /// Approved post count for the item's product, or 0 without a product
    async fn approved_posts_for(&self, item: &ContentItem) -> Result<i64, LifecycleError> {
        let product_id = match (item.product_id, item.product_name.as_deref()) {
            (Some(id), _) => Some(id),
            (None, Some(name)) if !name.trim().is_empty() => {
                self.store.find_product_id_by_name(name.trim()).await?
            }
            _ => None,
        };

        match product_id {
            Some(id) => Ok(self.store.count_approved_platform_posts(id).await?),
            None => Ok(0),
        }
    }
}
