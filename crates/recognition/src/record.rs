/// One identified food item with its nutrition figures.
///
/// Built only from a recognition or search response and never mutated after.
/// The service reports `confidence` in `[0, 1]`; it is carried as received.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodRecord {
    name: String,
    calories: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    confidence: f64,
}

impl FoodRecord {
    pub fn new(
        name: impl Into<String>,
        calories: f64,
        protein: f64,
        carbs: f64,
        fat: f64,
        confidence: f64,
    ) -> Self {
        Self {
            name: name.into(),
            calories,
            protein,
            carbs,
            fat,
            confidence,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn calories(&self) -> f64 {
        self.calories
    }

    pub fn protein(&self) -> f64 {
        self.protein
    }

    pub fn carbs(&self) -> f64 {
        self.carbs
    }

    pub fn fat(&self) -> f64 {
        self.fat
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Confidence as a whole percentage, e.g. `0.92` -> `92`.
    pub fn confidence_percent(&self) -> i64 {
        (self.confidence * 100.0).round() as i64
    }

    /// `95 cal • 0.5g protein • 25g carbs • 0.3g fat`
    pub fn macros_line(&self) -> String {
        format!(
            "{} cal • {}g protein • {}g carbs • {}g fat",
            self.calories, self.protein, self.carbs, self.fat
        )
    }
}

/// Sum of calories over a result list.
pub fn total_calories(records: &[FoodRecord]) -> f64 {
    records.iter().map(FoodRecord::calories).sum()
}
