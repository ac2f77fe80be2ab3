use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct Record {
    pub id: Uuid,
    pub amount: Decimal,
    pub budget_id: Uuid,
    pub category_id: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Records visible to `user_id`: those whose parent budget the user
/// owns. The `budget` and `category` filters combine with OR when both
/// are present, so supplying both widens the result set.
pub async fn list_for_user(
    db: &PgPool,
    user_id: Uuid,
    budget: Option<Uuid>,
    category_ids: &[Uuid],
) -> sqlx::Result<Vec<Record>> {
    sqlx::query_as::<_, Record>(
        r#"
        SELECT r.id, r.amount, r.budget_id, r.category_id, r.created_at, r.updated_at
        FROM records r
        JOIN budget_owners o ON o.budget_id = r.budget_id
        WHERE o.user_id = $1
          AND ($2 OR r.budget_id = $3 OR r.category_id = ANY($4::uuid[]))
        ORDER BY r.created_at, r.id
        "#,
    )
    .bind(user_id)
    .bind(budget.is_none() && category_ids.is_empty())
    .bind(budget)
    .bind(category_ids)
    .fetch_all(db)
    .await
}

pub async fn list_for_budgets(db: &PgPool, budget_ids: &[Uuid]) -> sqlx::Result<Vec<Record>> {
    sqlx::query_as::<_, Record>(
        r#"
        SELECT id, amount, budget_id, category_id, created_at, updated_at
        FROM records
        WHERE budget_id = ANY($1::uuid[])
        ORDER BY created_at, id
        "#,
    )
    .bind(budget_ids)
    .fetch_all(db)
    .await
}

pub async fn find_for_user(
    db: &PgPool,
    user_id: Uuid,
    record_id: Uuid,
) -> sqlx::Result<Option<Record>> {
    sqlx::query_as::<_, Record>(
        r#"
        SELECT r.id, r.amount, r.budget_id, r.category_id, r.created_at, r.updated_at
        FROM records r
        JOIN budget_owners o ON o.budget_id = r.budget_id
        WHERE r.id = $2 AND o.user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(record_id)
    .fetch_optional(db)
    .await
}

pub async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    budget_id: Uuid,
    category_id: Option<Uuid>,
    amount: Decimal,
) -> sqlx::Result<Record> {
    sqlx::query_as::<_, Record>(
        r#"
        INSERT INTO records (amount, budget_id, category_id)
        VALUES ($1, $2, $3)
        RETURNING id, amount, budget_id, category_id, created_at, updated_at
        "#,
    )
    .bind(amount)
    .bind(budget_id)
    .bind(category_id)
    .fetch_one(&mut **tx)
    .await
}

/// Applies the given changes; `set_category` controls whether the
/// category column is written at all (clearing it writes NULL).
pub async fn update_tx(
    tx: &mut Transaction<'_, Postgres>,
    record_id: Uuid,
    amount: Option<Decimal>,
    budget_id: Option<Uuid>,
    set_category: bool,
    category_id: Option<Uuid>,
) -> sqlx::Result<Record> {
    sqlx::query_as::<_, Record>(
        r#"
        UPDATE records
        SET amount = COALESCE($2, amount),
            budget_id = COALESCE($3, budget_id),
            category_id = CASE WHEN $4 THEN $5 ELSE category_id END,
            updated_at = now()
        WHERE id = $1
        RETURNING id, amount, budget_id, category_id, created_at, updated_at
        "#,
    )
    .bind(record_id)
    .bind(amount)
    .bind(budget_id)
    .bind(set_category)
    .bind(category_id)
    .fetch_one(&mut **tx)
    .await
}

/// Deletes the record only when `user_id` owns its parent budget.
pub async fn delete_owned(db: &PgPool, user_id: Uuid, record_id: Uuid) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM records r
        WHERE r.id = $1
          AND EXISTS (
              SELECT 1 FROM budget_owners o
              WHERE o.budget_id = r.budget_id AND o.user_id = $2
          )
        "#,
    )
    .bind(record_id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}
