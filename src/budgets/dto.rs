use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::{ApiError, FieldErrors},
    records::dto::{NewRecord, RecordPayload, RecordResponse},
};

/// Create body for `POST /budgets`; records may embed categories.
#[derive(Debug, Deserialize)]
pub struct CreateBudgetRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub owners: Vec<Uuid>,
    #[serde(default)]
    pub records: Option<Vec<RecordPayload>>,
}

/// Partial update body; `owners`, when present, replaces the whole set.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateBudgetRequest {
    pub name: Option<String>,
    pub owners: Option<Vec<Uuid>>,
}

/// A budget-create request after field validation. Owner existence is
/// checked against the database by the service layer.
#[derive(Debug)]
pub struct NewBudget {
    pub name: String,
    pub owners: Vec<Uuid>,
    pub records: Vec<NewRecord>,
}

/// Validated partial update.
#[derive(Debug)]
pub struct BudgetChanges {
    pub name: Option<String>,
    pub owners: Option<Vec<Uuid>>,
}

fn clean_budget_name(name: Option<&str>, errors: &mut FieldErrors) -> Option<String> {
    let name = match name {
        None => {
            errors.push("name", "This field is required.");
            return None;
        }
        Some(name) => name.trim(),
    };
    if name.is_empty() {
        errors.push("name", "This field may not be blank.");
        return None;
    }
    if name.chars().count() > 30 {
        errors.push("name", "Ensure this field has no more than 30 characters.");
        return None;
    }
    Some(name.to_string())
}

impl CreateBudgetRequest {
    /// Everything checkable without the database happens here, before
    /// any row is written: name, owner-list shape, every amount.
    pub fn validate(self) -> Result<NewBudget, ApiError> {
        let mut errors = FieldErrors::default();

        let name = clean_budget_name(self.name.as_deref(), &mut errors);
        if self.owners.is_empty() {
            errors.push("owners", "This list may not be empty.");
        }

        let mut records = Vec::new();
        for (i, payload) in self.records.unwrap_or_default().iter().enumerate() {
            if let Some(record) = payload.parse(&format!("records[{i}]"), &mut errors) {
                records.push(record);
            }
        }

        match name {
            Some(name) if errors.is_empty() => Ok(NewBudget {
                name,
                owners: self.owners,
                records,
            }),
            _ => Err(ApiError::Validation(errors)),
        }
    }
}

impl UpdateBudgetRequest {
    pub fn validate(self) -> Result<BudgetChanges, ApiError> {
        let mut errors = FieldErrors::default();

        let name = match &self.name {
            None => None,
            Some(_) => clean_budget_name(self.name.as_deref(), &mut errors),
        };
        if let Some(owners) = &self.owners {
            if owners.is_empty() {
                errors.push("owners", "This list may not be empty.");
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        Ok(BudgetChanges {
            name,
            owners: self.owners,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BudgetResponse {
    pub id: Uuid,
    pub name: String,
    pub owners: Vec<Uuid>,
    pub records_count: i64,
    pub records: Vec<RecordResponse>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Query parameters for `GET /budgets`; `category` may repeat.
#[derive(Debug, Deserialize)]
pub struct BudgetListQuery {
    #[serde(default)]
    pub category: Vec<Uuid>,
}
