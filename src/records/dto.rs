use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    categories::dto::CategoryResponse,
    error::{ApiError, FieldErrors},
};

/// Reference to a category in a write payload: either an existing id or
/// a name to look up or create.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CategoryRef {
    Id(Uuid),
    New { name: String },
}

/// Flat create body for `POST /records`.
#[derive(Debug, Deserialize)]
pub struct CreateRecordRequest {
    pub amount: Option<Value>,
    pub budget: Option<Uuid>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
}

/// One embedded record inside a budget-create payload.
#[derive(Debug, Deserialize)]
pub struct RecordPayload {
    pub amount: Option<Value>,
    #[serde(default)]
    pub category: Option<CategoryRef>,
}

/// Partial update body. `category` distinguishes an absent key (leave
/// unchanged) from an explicit null (clear the category).
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRecordRequest {
    pub amount: Option<Value>,
    pub budget: Option<Uuid>,
    #[serde(default, deserialize_with = "double_option")]
    pub category: Option<Option<CategoryRef>>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// An embedded record after amount validation.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub amount: Decimal,
    pub category: Option<CategoryRef>,
}

/// A flat create request after validation.
#[derive(Debug)]
pub struct FlatNewRecord {
    pub amount: Decimal,
    pub budget: Uuid,
    pub category: Option<CategoryRef>,
}

/// Validated partial update.
#[derive(Debug)]
pub struct RecordChanges {
    pub amount: Option<Decimal>,
    pub budget: Option<Uuid>,
    pub category: Option<Option<CategoryRef>>,
}

impl RecordPayload {
    /// Parses the amount, pushing any error under `<field>.amount`.
    pub fn parse(&self, field: &str, errors: &mut FieldErrors) -> Option<NewRecord> {
        match &self.amount {
            None => {
                errors.push(format!("{field}.amount"), "This field is required.");
                None
            }
            Some(value) => match parse_amount(value) {
                Ok(amount) => Some(NewRecord {
                    amount,
                    category: self.category.clone(),
                }),
                Err(message) => {
                    errors.push(format!("{field}.amount"), message);
                    None
                }
            },
        }
    }
}

impl CreateRecordRequest {
    pub fn validate(self) -> Result<FlatNewRecord, ApiError> {
        let mut errors = FieldErrors::default();
        let amount = match &self.amount {
            None => {
                errors.push("amount", "This field is required.");
                None
            }
            Some(value) => match parse_amount(value) {
                Ok(amount) => Some(amount),
                Err(message) => {
                    errors.push("amount", message);
                    None
                }
            },
        };
        if self.budget.is_none() {
            errors.push("budget", "This field is required.");
        }
        match (amount, self.budget) {
            (Some(amount), Some(budget)) if errors.is_empty() => Ok(FlatNewRecord {
                amount,
                budget,
                category: self.category,
            }),
            _ => Err(ApiError::Validation(errors)),
        }
    }
}

impl UpdateRecordRequest {
    pub fn validate(self) -> Result<RecordChanges, ApiError> {
        let amount = match &self.amount {
            None => None,
            Some(value) => {
                Some(parse_amount(value).map_err(|message| {
                    ApiError::Validation(FieldErrors::single("amount", message))
                })?)
            }
        };
        Ok(RecordChanges {
            amount,
            budget: self.budget,
            category: self.category,
        })
    }
}

/// Accepts decimal strings or JSON numbers; at most 2 decimal places,
/// 6 digits in total, 4 before the decimal point.
pub(crate) fn parse_amount(value: &Value) -> Result<Decimal, String> {
    const INVALID: &str = "A valid number is required.";
    let raw = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        _ => return Err(INVALID.into()),
    };
    let amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| INVALID.to_string())?;

    let decimals = amount.scale() as usize;
    if decimals > 2 {
        return Err("Ensure that there are no more than 2 decimal places.".into());
    }
    let mantissa_digits = amount.mantissa().unsigned_abs().to_string().len();
    let digits = mantissa_digits.max(decimals);
    if digits > 6 {
        return Err("Ensure that there are no more than 6 digits in total.".into());
    }
    if digits - decimals > 4 {
        return Err("Ensure that there are no more than 4 digits before the decimal point.".into());
    }
    Ok(amount)
}

#[derive(Debug, Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub amount: Decimal,
    pub budget: Uuid,
    pub category: Option<CategoryResponse>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Query parameters for `GET /records`; `category` may repeat.
#[derive(Debug, Deserialize)]
pub struct RecordListQuery {
    pub budget: Option<Uuid>,
    #[serde(default)]
    pub category: Vec<Uuid>,
}

#[cfg(test)]
mod amount_tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn accepts_strings_and_numbers() {
        assert_eq!(parse_amount(&json!("25.05")).unwrap(), dec("25.05"));
        assert_eq!(parse_amount(&json!("-20.12")).unwrap(), dec("-20.12"));
        assert_eq!(parse_amount(&json!(15)).unwrap(), dec("15"));
        assert_eq!(parse_amount(&json!(25.05)).unwrap(), dec("25.05"));
        assert_eq!(parse_amount(&json!("1234.56")).unwrap(), dec("1234.56"));
        assert_eq!(parse_amount(&json!("0")).unwrap(), dec("0"));
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(
            parse_amount(&json!("xxxx")).unwrap_err(),
            "A valid number is required."
        );
        assert!(parse_amount(&json!(null)).is_err());
        assert!(parse_amount(&json!(["25.05"])).is_err());
    }

    #[test]
    fn rejects_too_many_decimal_places() {
        let err = parse_amount(&json!("123.456")).unwrap_err();
        assert!(err.contains("2 decimal places"));
        // Trailing zeros still count as stated places.
        assert!(parse_amount(&json!("25.050")).is_err());
    }

    #[test]
    fn rejects_too_many_digits() {
        let err = parse_amount(&json!("12345678")).unwrap_err();
        assert!(err.contains("6 digits in total"));
        let err = parse_amount(&json!("12345.6")).unwrap_err();
        assert!(err.contains("before the decimal point"));
        assert!(parse_amount(&json!("-12345.67")).is_err());
    }
}
