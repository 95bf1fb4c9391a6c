//! Content and catalog queries
//!
//! All functions use the generic Executor pattern, allowing them to work with
//! both `&PgPool` (for standalone queries) and `&mut PgConnection` (for transactions).

use sqlx::{Executor, Postgres};

use crate::domain::{ContentItem, ContentOutput, ContentStatus, NewContentOutput};

const CONTENT_ITEM_COLUMNS: &str =
    "id, owner_id, title, status, product_id, product_name, metadata, created_at, updated_at";

pub async fn get_content_item<'e, E>(executor: E, id: i64) -> Result<Option<ContentItem>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let query = format!("SELECT {CONTENT_ITEM_COLUMNS} FROM content_items WHERE id = $1");
    sqlx::query_as::<_, ContentItem>(&query)
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Conditional status update. Returns true if the item was in `expected`.
pub async fn compare_and_set_status<'e, E>(
    executor: E,
    id: i64,
    expected: ContentStatus,
    next: ContentStatus,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        "UPDATE content_items
         SET status = $3, updated_at = NOW()
         WHERE id = $1 AND status = $2",
    )
    .bind(id)
    .bind(expected)
    .bind(next)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_outputs<'e, E>(
    executor: E,
    content_item_id: i64,
) -> Result<Vec<ContentOutput>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, ContentOutput>(
        "SELECT id, content_item_id, output_type, payload, created_at
         FROM content_outputs
         WHERE content_item_id = $1
         ORDER BY id",
    )
    .bind(content_item_id)
    .fetch_all(executor)
    .await
}

pub async fn insert_output<'e, E>(
    executor: E,
    output: &NewContentOutput,
) -> Result<ContentOutput, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, ContentOutput>(
        "INSERT INTO content_outputs (content_item_id, output_type, payload)
         VALUES ($1, $2, $3)
         RETURNING id, content_item_id, output_type, payload, created_at",
    )
    .bind(output.content_item_id)
    .bind(&output.output_type)
    .bind(&output.payload)
    .fetch_one(executor)
    .await
}

/// Case-insensitive exact match. The lowest id wins when names collide.
pub async fn find_product_id_by_name<'e, E>(
    executor: E,
    name: &str,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT id FROM products WHERE LOWER(name) = LOWER($1) ORDER BY id LIMIT 1",
    )
    .bind(name)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(id,)| id))
}

pub async fn count_approved_platform_posts<'e, E>(
    executor: E,
    product_id: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM platform_posts WHERE product_id = $1 AND approved",
    )
    .bind(product_id)
    .fetch_one(executor)
    .await?;

    Ok(count)
}

pub async fn approve_platform_post<'e, E>(
    executor: E,
    platform_post_id: i64,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        "UPDATE platform_posts SET approved = TRUE WHERE id = $1 RETURNING product_id",
    )
    .bind(platform_post_id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(|(product_id,)| product_id))
}

pub async fn content_items_for_product<'e, E>(
    executor: E,
    product_id: i64,
) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT c.id
         FROM content_items c
         LEFT JOIN products p ON p.id = $1
         WHERE c.product_id = $1
            OR (c.product_id IS NULL AND LOWER(c.product_name) = LOWER(p.name))
         ORDER BY c.id",
    )
    .bind(product_id)
    .fetch_all(executor)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
