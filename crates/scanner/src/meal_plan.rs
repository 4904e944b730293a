use recognition::FoodRecord;
use std::sync::{Mutex, PoisonError};

/// Receives the records a user adds to their meal plan. Persistence lives
/// behind this trait, outside the scan flow.
pub trait MealPlanSink: Send + Sync {
    fn append(&self, record: &FoodRecord) -> anyhow::Result<()>;
}

/// Logs each added record.
#[derive(Debug, Default)]
pub struct LoggingMealPlan;

impl MealPlanSink for LoggingMealPlan {
    fn append(&self, record: &FoodRecord) -> anyhow::Result<()> {
        tracing::info!(
            food = record.name(),
            calories = record.calories(),
            confidence = record.confidence(),
            "Added to meal plan"
        );
        Ok(())
    }
}

/// Keeps added records in memory.
#[derive(Debug, Default)]
pub struct InMemoryMealPlan {
    entries: Mutex<Vec<FoodRecord>>,
}

impl InMemoryMealPlan {
    pub fn entries(&self) -> Vec<FoodRecord> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl MealPlanSink for InMemoryMealPlan {
    fn append(&self, record: &FoodRecord) -> anyhow::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
