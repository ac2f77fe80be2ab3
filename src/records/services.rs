use std::collections::HashMap;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    budgets,
    categories::{self, dto::CategoryResponse, handlers::clean_name, repo::Category},
    error::{validation, ApiError},
    records::{
        dto::{CategoryRef, FlatNewRecord, RecordChanges, RecordResponse},
        repo::{self, Record},
    },
};

/// Resolves a category reference inside the caller's transaction: ids
/// must exist, names go through get-or-create. `field` names the spot
/// in the payload for 400 bodies.
pub(crate) async fn resolve_category_tx(
    tx: &mut Transaction<'_, Postgres>,
    category: &CategoryRef,
    field: &str,
) -> Result<Uuid, ApiError> {
    match category {
        CategoryRef::Id(id) => {
            if categories::repo::exists_tx(tx, *id).await? {
                Ok(*id)
            } else {
                Err(validation(
                    field,
                    format!("Invalid pk \"{id}\" - object does not exist."),
                ))
            }
        }
        CategoryRef::New { name } => {
            let name = clean_name(Some(name), &format!("{field}.name"))?;
            let category = categories::repo::get_or_create_tx(tx, &name).await?;
            Ok(category.id)
        }
    }
}

pub async fn create_record(db: &PgPool, input: FlatNewRecord) -> Result<Record, ApiError> {
    if !budgets::repo::exists(db, input.budget).await? {
        return Err(validation(
            "budget",
            format!("Invalid pk \"{}\" - object does not exist.", input.budget),
        ));
    }

    let mut tx = db.begin().await?;
    let category_id = match &input.category {
        Some(category) => Some(resolve_category_tx(&mut tx, category, "category").await?),
        None => None,
    };
    let record = repo::insert_tx(&mut tx, input.budget, category_id, input.amount).await?;
    tx.commit().await?;
    Ok(record)
}

pub async fn update_record(
    db: &PgPool,
    user_id: Uuid,
    record_id: Uuid,
    changes: RecordChanges,
) -> Result<Record, ApiError> {
    let existing = repo::find_for_user(db, user_id, record_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if let Some(budget_id) = changes.budget {
        if !budgets::repo::exists(db, budget_id).await? {
            return Err(validation(
                "budget",
                format!("Invalid pk \"{budget_id}\" - object does not exist."),
            ));
        }
    }

    let mut tx = db.begin().await?;
    let (set_category, category_id) = match &changes.category {
        None => (false, None),
        Some(None) => (true, None),
        Some(Some(category)) => (
            true,
            Some(resolve_category_tx(&mut tx, category, "category").await?),
        ),
    };
    let record = repo::update_tx(
        &mut tx,
        existing.id,
        changes.amount,
        changes.budget,
        set_category,
        category_id,
    )
    .await?;
    tx.commit().await?;
    Ok(record)
}

/// Builds responses, resolving referenced categories in one batch query.
pub async fn to_responses(
    db: &PgPool,
    records: Vec<Record>,
) -> Result<Vec<RecordResponse>, ApiError> {
    let mut category_ids: Vec<Uuid> = records.iter().filter_map(|r| r.category_id).collect();
    category_ids.sort_unstable();
    category_ids.dedup();

    let categories = categories::repo::find_by_ids(db, &category_ids).await?;
    let by_id: HashMap<Uuid, Category> = categories.into_iter().map(|c| (c.id, c)).collect();

    Ok(records
        .into_iter()
        .map(|record| {
            let category = record
                .category_id
                .and_then(|id| by_id.get(&id).cloned())
                .map(CategoryResponse::from);
            RecordResponse {
                id: record.id,
                amount: record.amount,
                budget: record.budget_id,
                category,
                created_at: record.created_at,
                updated_at: record.updated_at,
            }
        })
        .collect())
}

pub async fn to_response(db: &PgPool, record: Record) -> Result<RecordResponse, ApiError> {
    let mut responses = to_responses(db, vec![record]).await?;
    responses
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("record response assembly lost its row")))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;

    const BATMAN: &str = "11111111-1111-1111-1111-111111111111";
    const FOOD: &str = "aaaaaaaa-0000-0000-0000-000000000002";
    const HOME: &str = "bbbbbbbb-0000-0000-0000-000000000001";

    fn uuid(s: &str) -> Uuid {
        s.parse().unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn flat_create_with_existing_category_id(pool: PgPool) -> Result<(), ApiError> {
        let record = create_record(
            &pool,
            FlatNewRecord {
                amount: dec("-42.50"),
                budget: uuid(HOME),
                category: Some(CategoryRef::Id(uuid(FOOD))),
            },
        )
        .await?;
        assert_eq!(record.budget_id, uuid(HOME));
        assert_eq!(record.category_id, Some(uuid(FOOD)));
        assert_eq!(record.amount, dec("-42.50"));
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn flat_create_resolves_category_by_name(pool: PgPool) -> Result<(), ApiError> {
        let record = create_record(
            &pool,
            FlatNewRecord {
                amount: dec("12.00"),
                budget: uuid(HOME),
                category: Some(CategoryRef::New {
                    name: "food".into(),
                }),
            },
        )
        .await?;
        // The existing "food" row is reused, not duplicated.
        assert_eq!(record.category_id, Some(uuid(FOOD)));
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM categories WHERE name = 'food'")
                .fetch_one(&pool)
                .await
                .map_err(ApiError::from)?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn flat_create_rejects_unknown_budget(pool: PgPool) {
        let err = create_record(
            &pool,
            FlatNewRecord {
                amount: dec("5.00"),
                budget: Uuid::new_v4(),
                category: None,
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.0.contains_key("budget")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn flat_create_rejects_unknown_category_id_without_rows(pool: PgPool) {
        let before: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&pool)
            .await
            .unwrap();

        let err = create_record(
            &pool,
            FlatNewRecord {
                amount: dec("5.00"),
                budget: uuid(HOME),
                category: Some(CategoryRef::Id(Uuid::new_v4())),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let after: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM records")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(before, after);
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn update_can_change_amount_and_clear_category(pool: PgPool) -> Result<(), ApiError> {
        let record_id = uuid("dddddddd-0000-0000-0000-000000000001");
        let updated = update_record(
            &pool,
            uuid(BATMAN),
            record_id,
            RecordChanges {
                amount: Some(dec("99.99")),
                budget: None,
                category: Some(None),
            },
        )
        .await?;
        assert_eq!(updated.amount, dec("99.99"));
        assert_eq!(updated.category_id, None);
        assert_eq!(updated.budget_id, uuid(HOME));
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn update_leaves_category_alone_when_absent(pool: PgPool) -> Result<(), ApiError> {
        let record_id = uuid("dddddddd-0000-0000-0000-000000000001");
        let updated = update_record(
            &pool,
            uuid(BATMAN),
            record_id,
            RecordChanges {
                amount: Some(dec("1.00")),
                budget: None,
                category: None,
            },
        )
        .await?;
        assert_eq!(
            updated.category_id,
            Some(uuid("aaaaaaaa-0000-0000-0000-000000000001"))
        );
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn update_by_non_owner_is_not_found(pool: PgPool) {
        let record_id = uuid("dddddddd-0000-0000-0000-000000000001");
        let err = update_record(
            &pool,
            uuid("22222222-2222-2222-2222-222222222222"),
            record_id,
            RecordChanges {
                amount: Some(dec("1.00")),
                budget: None,
                category: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));
    }
}
