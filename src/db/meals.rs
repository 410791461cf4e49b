//! Meal and food-category records.

use crate::db::users::is_unique_violation;
use crate::error::{AssistantError, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Categories seeded into a fresh database: (name, nutrition value, recommended frequency).
pub const DEFAULT_FOOD_CATEGORIES: [(&str, &str, &str); 8] = [
    ("蔬菜类", "富含维生素、矿物质和膳食纤维，低热量", "每天至少摄入300-500克"),
    ("水果类", "富含维生素C、抗氧化物和膳食纤维", "每天1-2份"),
    ("谷物类", "提供碳水化合物和B族维生素，是能量的主要来源", "每天作为主食"),
    ("肉蛋类", "富含优质蛋白质和铁", "每周3-5次，每次适量"),
    ("奶制品", "富含钙质和蛋白质", "每天1-2份"),
    ("豆制品", "提供植物蛋白和异黄酮", "每周3-4次"),
    ("坚果类", "含有健康脂肪和多种矿物质", "每天一小把（约25克）"),
    ("海鲜类", "富含优质蛋白质和ω-3脂肪酸", "每周2-3次"),
];

/// Meal slot, mirroring the CHECK constraint on `meals.meal_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl FromStr for MealType {
    type Err = AssistantError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            "snack" => Ok(Self::Snack),
            other => Err(AssistantError::database(format!(
                "Unknown meal type: {other}"
            ))),
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A food category with nutrition guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FoodCategory {
    pub category_id: i64,
    pub category_name: String,
    pub nutrition_value: Option<String>,
    pub recommended_frequency: Option<String>,
}

/// Input for [`add_meal`].
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub user_id: i64,
    pub meal_type: MealType,
    pub food_name: String,
    pub category_id: Option<i64>,
    pub description: Option<String>,
    /// `YYYY-MM-DD`; the database default (today) is used when absent.
    pub meal_date: Option<String>,
}

impl NewMeal {
    pub fn new(user_id: i64, meal_type: MealType, food_name: impl Into<String>) -> Self {
        Self {
            user_id,
            meal_type,
            food_name: food_name.into(),
            category_id: None,
            description: None,
            meal_date: None,
        }
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn on_date(mut self, meal_date: impl Into<String>) -> Self {
        self.meal_date = Some(meal_date.into());
        self
    }
}

/// A meal joined with its category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meal {
    pub meal_id: i64,
    pub meal_date: String,
    pub meal_type: MealType,
    pub food_name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub nutrition_value: Option<String>,
    pub recommended_frequency: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
struct MealRow {
    meal_id: i64,
    meal_date: String,
    meal_type: String,
    food_name: String,
    description: Option<String>,
    category_id: Option<i64>,
    category_name: Option<String>,
    nutrition_value: Option<String>,
    recommended_frequency: Option<String>,
}

impl TryFrom<MealRow> for Meal {
    type Error = AssistantError;

    fn try_from(row: MealRow) -> Result<Self> {
        Ok(Self {
            meal_id: row.meal_id,
            meal_date: row.meal_date,
            meal_type: row.meal_type.parse()?,
            food_name: row.food_name,
            description: row.description,
            category_id: row.category_id,
            category_name: row.category_name,
            nutrition_value: row.nutrition_value,
            recommended_frequency: row.recommended_frequency,
        })
    }
}

/// Inclusive date range for [`list_user_meals`].
#[derive(Debug, Clone, Default)]
pub struct MealFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Adds a food category. Returns `None` if the name already exists.
pub async fn add_food_category(
    pool: &SqlitePool,
    category_name: &str,
    nutrition_value: Option<&str>,
    recommended_frequency: Option<&str>,
) -> Result<Option<i64>> {
    let result = sqlx::query(
        "INSERT INTO food_categories (category_name, nutrition_value, recommended_frequency) \
         VALUES (?, ?, ?)",
    )
    .bind(category_name)
    .bind(nutrition_value)
    .bind(recommended_frequency)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(Some(done.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(AssistantError::database(format!(
            "Failed to add food category: {e}"
        ))),
    }
}

/// Lists all food categories by id.
pub async fn list_food_categories(pool: &SqlitePool) -> Result<Vec<FoodCategory>> {
    sqlx::query_as::<_, FoodCategory>(
        "SELECT category_id, category_name, nutrition_value, recommended_frequency \
         FROM food_categories ORDER BY category_id",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| AssistantError::database(format!("Failed to list food categories: {e}")))
}

/// Records a meal and returns its id.
pub async fn add_meal(pool: &SqlitePool, meal: &NewMeal) -> Result<i64> {
    // COALESCE keeps the column default when no date is given
    let result = sqlx::query(
        r#"
        INSERT INTO meals (user_id, meal_type, food_name, category_id, description, meal_date)
        VALUES (?, ?, ?, ?, ?, COALESCE(?, CURRENT_DATE))
        "#,
    )
    .bind(meal.user_id)
    .bind(meal.meal_type.as_str())
    .bind(&meal.food_name)
    .bind(meal.category_id)
    .bind(&meal.description)
    .bind(&meal.meal_date)
    .execute(pool)
    .await
    .map_err(|e| AssistantError::database(format!("Failed to add meal: {e}")))?;

    Ok(result.last_insert_rowid())
}

/// Lists a user's meals, newest first, optionally bounded by date.
pub async fn list_user_meals(
    pool: &SqlitePool,
    user_id: i64,
    filter: &MealFilter,
) -> Result<Vec<Meal>> {
    let mut query = String::from(
        r#"
        SELECT m.meal_id, m.meal_date, m.meal_type, m.food_name, m.description,
               c.category_id, c.category_name, c.nutrition_value, c.recommended_frequency
        FROM meals m
        LEFT JOIN food_categories c ON m.category_id = c.category_id
        WHERE m.user_id = ?
        "#,
    );

    if filter.start_date.is_some() {
        query.push_str(" AND m.meal_date >= ?");
    }
    if filter.end_date.is_some() {
        query.push_str(" AND m.meal_date <= ?");
    }
    query.push_str(" ORDER BY m.meal_date DESC, m.meal_type");

    let mut q = sqlx::query_as::<_, MealRow>(&query).bind(user_id);
    if let Some(ref start) = filter.start_date {
        q = q.bind(start);
    }
    if let Some(ref end) = filter.end_date {
        q = q.bind(end);
    }

    let rows = q
        .fetch_all(pool)
        .await
        .map_err(|e| AssistantError::database(format!("Failed to list meals: {e}")))?;

    rows.into_iter().map(Meal::try_from).collect()
}
