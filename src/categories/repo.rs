use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

pub async fn list(db: &PgPool) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, created_at, updated_at
        FROM categories
        ORDER BY created_at, id
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn find_by_ids(db: &PgPool, ids: &[Uuid]) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, created_at, updated_at
        FROM categories
        WHERE id = ANY($1::uuid[])
        "#,
    )
    .bind(ids)
    .fetch_all(db)
    .await
}

/// Direct creation path: no name deduplication here. Two categories may
/// share a name when created this way.
pub async fn insert(db: &PgPool, name: &str) -> sqlx::Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(name)
    .fetch_one(db)
    .await
}

pub async fn exists_tx(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM categories WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

/// Name-keyed lookup-or-insert inside the caller's transaction. When
/// duplicate names exist (possible through the direct path), the oldest
/// row wins deterministically.
pub async fn get_or_create_tx(
    tx: &mut Transaction<'_, Postgres>,
    name: &str,
) -> sqlx::Result<Category> {
    let existing = sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, created_at, updated_at
        FROM categories
        WHERE name = $1
        ORDER BY created_at, id
        LIMIT 1
        "#,
    )
    .bind(name)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(category) = existing {
        return Ok(category);
    }

    sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
}

/// Rows affected; a category still referenced by records makes Postgres
/// reject the delete with a foreign-key violation.
pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(result.rows_affected())
}
