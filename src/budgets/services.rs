use std::collections::HashMap;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    auth,
    budgets::{
        dto::{BudgetChanges, BudgetResponse, NewBudget},
        repo::{self, Budget},
    },
    error::{ApiError, FieldErrors},
    records,
};

/// Owner lists must be non-empty and made of existing users. Returns
/// the deduplicated ids, ready for a single bulk insert.
async fn validate_owners(db: &PgPool, owners: &[Uuid]) -> Result<Vec<Uuid>, ApiError> {
    if owners.is_empty() {
        return Err(ApiError::Validation(FieldErrors::single(
            "owners",
            "This list may not be empty.",
        )));
    }
    let mut ids = owners.to_vec();
    ids.sort_unstable();
    ids.dedup();

    let existing = auth::repo::existing_ids(db, &ids).await?;
    if existing.len() != ids.len() {
        let mut errors = FieldErrors::default();
        for missing in ids.iter().filter(|id| !existing.contains(id)) {
            errors.push(
                "owners",
                format!("Invalid pk \"{missing}\" - object does not exist."),
            );
        }
        return Err(ApiError::Validation(errors));
    }
    Ok(ids)
}

/// Creates the budget, its owner set and any embedded records in one
/// transaction. Embedded categories resolve through get-or-create, so
/// a name repeated across records lands on a single row. Any failure
/// rolls the whole payload back.
pub async fn create_budget(db: &PgPool, input: NewBudget) -> Result<Budget, ApiError> {
    let owner_ids = validate_owners(db, &input.owners).await?;

    let mut tx = db.begin().await?;
    let budget = repo::insert_tx(&mut tx, &input.name).await?;
    repo::add_owners_tx(&mut tx, budget.id, &owner_ids).await?;

    for (i, record) in input.records.iter().enumerate() {
        let category_id = match &record.category {
            Some(category) => Some(
                records::services::resolve_category_tx(
                    &mut tx,
                    category,
                    &format!("records[{i}].category"),
                )
                .await?,
            ),
            None => None,
        };
        records::repo::insert_tx(&mut tx, budget.id, category_id, record.amount).await?;
    }

    tx.commit().await?;
    Ok(budget)
}

/// Renames and/or replaces the owner set. The owner list is a full
/// replacement: callers send the complete desired set.
pub async fn update_budget(
    db: &PgPool,
    user_id: Uuid,
    budget_id: Uuid,
    changes: BudgetChanges,
) -> Result<Budget, ApiError> {
    let budget = repo::find_for_user(db, user_id, budget_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let owner_ids = match &changes.owners {
        Some(owners) => Some(validate_owners(db, owners).await?),
        None => None,
    };

    let mut tx = db.begin().await?;
    if let Some(name) = &changes.name {
        repo::rename_tx(&mut tx, budget.id, name).await?;
    }
    if let Some(owner_ids) = owner_ids {
        repo::clear_owners_tx(&mut tx, budget.id).await?;
        repo::add_owners_tx(&mut tx, budget.id, &owner_ids).await?;
    }
    tx.commit().await?;

    // Unscoped re-read: the requester may have replaced themselves out
    // of the owner set.
    repo::find(db, budget.id).await?.ok_or(ApiError::NotFound)
}

/// Assembles full responses: owners and records are fetched in one
/// batch each, and `records_count` is derived from the loaded set.
pub async fn budget_responses(
    db: &PgPool,
    budgets: Vec<Budget>,
) -> Result<Vec<BudgetResponse>, ApiError> {
    let ids: Vec<Uuid> = budgets.iter().map(|b| b.id).collect();

    let mut owners_by_budget: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (budget_id, user_id) in repo::owners_of(db, &ids).await? {
        owners_by_budget.entry(budget_id).or_default().push(user_id);
    }

    let record_rows = records::repo::list_for_budgets(db, &ids).await?;
    let mut records_by_budget: HashMap<Uuid, Vec<_>> = HashMap::new();
    for response in records::services::to_responses(db, record_rows).await? {
        records_by_budget
            .entry(response.budget)
            .or_default()
            .push(response);
    }

    Ok(budgets
        .into_iter()
        .map(|budget| {
            let records = records_by_budget.remove(&budget.id).unwrap_or_default();
            BudgetResponse {
                id: budget.id,
                name: budget.name,
                owners: owners_by_budget.remove(&budget.id).unwrap_or_default(),
                records_count: records.len() as i64,
                records,
                created_at: budget.created_at,
                updated_at: budget.updated_at,
            }
        })
        .collect())
}

pub async fn budget_response(db: &PgPool, budget: Budget) -> Result<BudgetResponse, ApiError> {
    let mut responses = budget_responses(db, vec![budget]).await?;
    responses
        .pop()
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("budget response assembly lost its row")))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rust_decimal::Decimal;

    use super::*;
    use crate::records::dto::{CategoryRef, NewRecord};

    const BATMAN: &str = "11111111-1111-1111-1111-111111111111";
    const STAR_LORD: &str = "22222222-2222-2222-2222-222222222222";

    fn uuid(s: &str) -> Uuid {
        s.parse().unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn plain_record(amount: &str) -> NewRecord {
        NewRecord {
            amount: dec(amount),
            category: None,
        }
    }

    fn named_record(amount: &str, category: &str) -> NewRecord {
        NewRecord {
            amount: dec(amount),
            category: Some(CategoryRef::New {
                name: category.into(),
            }),
        }
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn creates_budget_with_records_and_derived_count(pool: PgPool) -> Result<(), ApiError> {
        let budget = create_budget(
            &pool,
            NewBudget {
                name: "Batman's budget".into(),
                owners: vec![uuid(BATMAN)],
                records: vec![
                    plain_record("25.05"),
                    plain_record("-20.12"),
                    plain_record("15.00"),
                    plain_record("-20.21"),
                ],
            },
        )
        .await?;

        let response = budget_response(&pool, budget).await?;
        assert_eq!(response.records_count, 4);
        assert_eq!(response.records.len(), 4);
        assert_eq!(response.owners, vec![uuid(BATMAN)]);

        let amounts: Vec<Decimal> = response.records.iter().map(|r| r.amount).collect();
        assert!(amounts.contains(&dec("25.05")));
        assert!(amounts.contains(&dec("-20.21")));
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn repeated_category_names_create_one_row(pool: PgPool) -> Result<(), ApiError> {
        let budget = create_budget(
            &pool,
            NewBudget {
                name: "groceries".into(),
                owners: vec![uuid(BATMAN)],
                records: vec![named_record("25.05", "food"), named_record("-20.12", "food")],
            },
        )
        .await?;

        let (categories,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM categories WHERE name = 'food'")
                .fetch_one(&pool)
                .await
                .map_err(ApiError::from)?;
        assert_eq!(categories, 1);

        let response = budget_response(&pool, budget).await?;
        assert_eq!(response.records_count, 2);
        let category_ids: Vec<_> = response
            .records
            .iter()
            .map(|r| r.category.as_ref().map(|c| c.id))
            .collect();
        assert_eq!(category_ids[0], category_ids[1]);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories")))]
    async fn nested_names_reuse_existing_categories(pool: PgPool) -> Result<(), ApiError> {
        create_budget(
            &pool,
            NewBudget {
                name: "trips".into(),
                owners: vec![uuid(BATMAN)],
                records: vec![named_record("-9.90", "transport")],
            },
        )
        .await?;

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM categories WHERE name = 'transport'")
                .fetch_one(&pool)
                .await
                .map_err(ApiError::from)?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn unknown_owner_fails_before_any_write(pool: PgPool) {
        let err = create_budget(
            &pool,
            NewBudget {
                name: "ghost".into(),
                owners: vec![Uuid::new_v4()],
                records: vec![plain_record("1.00")],
            },
        )
        .await
        .unwrap_err();
        match err {
            ApiError::Validation(errors) => assert!(errors.0.contains_key("owners")),
            other => panic!("unexpected error: {other:?}"),
        }

        let (budgets,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM budgets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(budgets, 0);
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users")))]
    async fn failing_embedded_record_rolls_everything_back(pool: PgPool) {
        // A category referenced by an id that does not exist fails the
        // nested write after the budget row was inserted; nothing may
        // survive the rollback.
        let err = create_budget(
            &pool,
            NewBudget {
                name: "doomed".into(),
                owners: vec![uuid(BATMAN)],
                records: vec![
                    named_record("10.00", "food"),
                    NewRecord {
                        amount: dec("5.00"),
                        category: Some(CategoryRef::Id(Uuid::new_v4())),
                    },
                ],
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        for table in ["budgets", "records", "categories"] {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&pool)
                .await
                .unwrap();
            assert_eq!(count, 0, "{table} should be empty after rollback");
        }
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn owner_patch_replaces_the_whole_set(pool: PgPool) -> Result<(), ApiError> {
        let home = uuid("bbbbbbbb-0000-0000-0000-000000000001");
        let updated = update_budget(
            &pool,
            uuid(BATMAN),
            home,
            BudgetChanges {
                name: None,
                owners: Some(vec![uuid(BATMAN), uuid(STAR_LORD)]),
            },
        )
        .await?;

        let response = budget_response(&pool, updated).await?;
        assert_eq!(response.owners, vec![uuid(BATMAN), uuid(STAR_LORD)]);

        // Replacement is total: handing the budget over works too.
        let updated = update_budget(
            &pool,
            uuid(BATMAN),
            home,
            BudgetChanges {
                name: None,
                owners: Some(vec![uuid(STAR_LORD)]),
            },
        )
        .await?;
        let response = budget_response(&pool, updated).await?;
        assert_eq!(response.owners, vec![uuid(STAR_LORD)]);
        Ok(())
    }

    #[sqlx::test(fixtures(path = "../../fixtures", scripts("users", "categories", "budgets")))]
    async fn non_owner_update_is_not_found_and_changes_nothing(pool: PgPool) {
        let home = uuid("bbbbbbbb-0000-0000-0000-000000000001");
        let err = update_budget(
            &pool,
            uuid(STAR_LORD),
            home,
            BudgetChanges {
                name: Some("stolen".into()),
                owners: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound));

        let (name,): (String,) = sqlx::query_as("SELECT name FROM budgets WHERE id = $1")
            .bind(home)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "home");
    }
}
