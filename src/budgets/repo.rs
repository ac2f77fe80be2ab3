use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Budget {
    pub id: Uuid,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Budgets owned by `user_id`. With category filters, only budgets
/// holding at least one record in any of the given categories match;
/// the EXISTS probe keeps each budget listed once.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    category_ids: &[Uuid],
) -> sqlx::Result<Vec<Budget>> {
    sqlx::query_as::<_, Budget>(
        r#"
        SELECT b.id, b.name, b.created_at, b.updated_at
        FROM budgets b
        JOIN budget_owners o ON o.budget_id = b.id
        WHERE o.user_id = $1
          AND ($2 OR EXISTS (
              SELECT 1 FROM records r
              WHERE r.budget_id = b.id AND r.category_id = ANY($3::uuid[])
          ))
        ORDER BY b.created_at, b.id
        "#,
    )
    .bind(user_id)
    .bind(category_ids.is_empty())
    .bind(category_ids)
    .fetch_all(db)
    .await
}

pub async fn find_for_user(
    db: &PgPool,
    user_id: Uuid,
    budget_id: Uuid,
) -> sqlx::Result<Option<Budget>> {
    sqlx::query_as::<_, Budget>(
        r#"
        SELECT b.id, b.name, b.created_at, b.updated_at
        FROM budgets b
        JOIN budget_owners o ON o.budget_id = b.id
        WHERE b.id = $2 AND o.user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(budget_id)
    .fetch_optional(db)
    .await
}

/// Unscoped lookup, for response assembly after writes that may have
/// removed the requester from the owner set.
pub async fn find(db: &PgPool, budget_id: Uuid) -> sqlx::Result<Option<Budget>> {
    sqlx::query_as::<_, Budget>(
        r#"
        SELECT id, name, created_at, updated_at
        FROM budgets
        WHERE id = $1
        "#,
    )
    .bind(budget_id)
    .fetch_optional(db)
    .await
}

pub async fn exists(db: &PgPool, budget_id: Uuid) -> sqlx::Result<bool> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM budgets WHERE id = $1")
        .bind(budget_id)
        .fetch_optional(db)
        .await?;
    Ok(row.is_some())
}

pub async fn owners_of(db: &PgPool, budget_ids: &[Uuid]) -> sqlx::Result<Vec<(Uuid, Uuid)>> {
    sqlx::query_as::<_, (Uuid, Uuid)>(
        r#"
        SELECT budget_id, user_id
        FROM budget_owners
        WHERE budget_id = ANY($1::uuid[])
        ORDER BY budget_id, user_id
        "#,
    )
    .bind(budget_ids)
    .fetch_all(db)
    .await
}

pub async fn insert_tx(tx: &mut Transaction<'_, Postgres>, name: &str) -> sqlx::Result<Budget> {
    sqlx::query_as::<_, Budget>(
        r#"
        INSERT INTO budgets (name)
        VALUES ($1)
        RETURNING id, name, created_at, updated_at
        "#,
    )
    .bind(name)
    .fetch_one(&mut **tx)
    .await
}

pub async fn add_owners_tx(
    tx: &mut Transaction<'_, Postgres>,
    budget_id: Uuid,
    owner_ids: &[Uuid],
) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO budget_owners (budget_id, user_id)
        SELECT $1, unnest($2::uuid[])
        "#,
    )
    .bind(budget_id)
    .bind(owner_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn clear_owners_tx(
    tx: &mut Transaction<'_, Postgres>,
    budget_id: Uuid,
) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM budget_owners WHERE budget_id = $1")
        .bind(budget_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn rename_tx(
    tx: &mut Transaction<'_, Postgres>,
    budget_id: Uuid,
    name: &str,
) -> sqlx::Result<()> {
    sqlx::query("UPDATE budgets SET name = $2, updated_at = now() WHERE id = $1")
        .bind(budget_id)
        .bind(name)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Deletes the budget only when `user_id` is an owner; records go with
/// it through the cascading foreign key, categories stay.
pub async fn delete_owned(db: &PgPool, user_id: Uuid, budget_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM budgets b
        WHERE b.id = $1
          AND EXISTS (
              SELECT 1 FROM budget_owners o
              WHERE o.budget_id = $1 AND o.user_id = $2
          )
        "#,
    )
    .bind(budget_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}
