//! Response schema of the food recognition service.
//!
//! The JSON shape is mapped to [`FoodRecord`] through an explicit conversion so
//! a schema change only touches this module.
use crate::error::FailureCause;
use crate::record::FoodRecord;
use serde::Deserialize;
use serde_json::Value;

/// One element of the `analyze` / `search` response array. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct FoodItemV1 {
    pub name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    pub confidence: f64,
}

impl From<FoodItemV1> for FoodRecord {
    fn from(item: FoodItemV1) -> Self {
        FoodRecord::new(
            item.name,
            item.calories,
            item.protein,
            item.carbs,
            item.fat,
            item.confidence,
        )
    }
}

/// Decode a response body. Only a JSON array, possibly empty, is a result list.
pub fn decode_records(body: &[u8]) -> Result<Vec<FoodRecord>, FailureCause> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FailureCause::Malformed(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(FailureCause::Malformed(format!(
            "expected a JSON array, got {}",
            kind_of(&value)
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<FoodItemV1>(item)
                .map(FoodRecord::from)
                .map_err(|e| FailureCause::Malformed(format!("item {index}: {e}")))
        })
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
