pub mod auth;
pub mod content;
pub mod social;
pub mod social_oauth;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::AppState;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(content::routes())
        .merge(social::routes())
        .merge(social_oauth::routes())
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::domain::social::{MediaItem, PostStatus, PostType, Provider};
    use crate::domain::{Actor, ContentStatus, NewContentItem, Role};
    use crate::services::publisher::PublishSettings;
    use crate::services::session;
    use crate::services::testing::{FakePlatform, connect_account, draft_post};
    use crate::store::{InMemoryStore, PostStore};

    const SECRET: &[u8] = b"router-test-secret";

    fn app(store: &Arc<InMemoryStore>) -> Router {
        let platform = Arc::new(FakePlatform::new());
        let state = AppState::new(
            store.clone(),
            platform.clone(),
            platform,
            PublishSettings::default(),
            SECRET.to_vec(),
        );
        build_routes().with_state(Arc::new(state))
    }

    fn seed_item(store: &InMemoryStore, status: ContentStatus) -> i64 {
        store
            .insert_content_item(NewContentItem {
                owner_id: 1,
                title: "Launch video".to_string(),
                status,
                product_id: None,
                product_name: None,
            })
            .id
    }

    fn transition_request(item_id: i64, to: &str, role: Role) -> Request<Body> {
        let token = session::create_access_token(&Actor::new(1, role), SECRET).unwrap();
        Request::builder()
            .method("POST")
            .uri(format!("/content/{}/transition", item_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!(r#"{{"to_status":"{}"}}"#, to)))
            .unwrap()
    }

    fn authed(method: &str, uri: String, user_id: i64) -> Request<Body> {
        let token = session::create_access_token(&Actor::new(user_id, Role::Staff), SECRET).unwrap();
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejected_transition_returns_conflict_with_valid_targets() {
        let store = Arc::new(InMemoryStore::new());
        let item_id = seed_item(&store, ContentStatus::Draft);

        let response = app(&store)
            .oneshot(transition_request(item_id, "published", Role::Staff))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = json_body(response).await;
        assert_eq!(body["current_status"], "draft");
        let targets: Vec<&str> = body["valid_targets"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(targets.contains(&"review"));
        assert!(!targets.contains(&"published"));
    }

    #[tokio::test]
    async fn test_allowed_transition_returns_item() {
        let store = Arc::new(InMemoryStore::new());
        let item_id = seed_item(&store, ContentStatus::Draft);

        let response = app(&store)
            .oneshot(transition_request(item_id, "review", Role::Staff))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "review");
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let store = Arc::new(InMemoryStore::new());
        let item_id = seed_item(&store, ContentStatus::Draft);

        let response = app(&store)
            .oneshot(
                Request::builder()
                    .uri(format!("/content/{}/transitions", item_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_users_post_cannot_be_published_or_read() {
        let store = Arc::new(InMemoryStore::new());
        let account = connect_account(&store, Provider::Facebook, "Acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Post,
            vec![MediaItem::image("https://cdn.example.com/a.jpg")],
        );
        store.link_account(post.id, account.id);

        let publish = app(&store)
            .oneshot(authed("POST", format!("/social/posts/{}/publish", post.id), 999))
            .await
            .unwrap();
        assert_eq!(publish.status(), StatusCode::NOT_FOUND);

        let metrics = app(&store)
            .oneshot(authed("GET", format!("/social/posts/{}/metrics", post.id), 999))
            .await
            .unwrap();
        assert_eq!(metrics.status(), StatusCode::NOT_FOUND);

        let unchanged = store.get_social_post(post.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, PostStatus::Draft);
    }

    #[tokio::test]
    async fn test_owner_can_publish_post() {
        let store = Arc::new(InMemoryStore::new());
        let account = connect_account(&store, Provider::Facebook, "Acme", Some(30)).await;
        let post = draft_post(
            &store,
            PostType::Post,
            vec![MediaItem::image("https://cdn.example.com/a.jpg")],
        );
        store.link_account(post.id, account.id);

        let response = app(&store)
            .oneshot(authed("POST", format!("/social/posts/{}/publish", post.id), 1))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "published");
    }
}
