//! Integration tests for the meal database accessors.

use meal_assistant::db::meals::{
    self, MealFilter, MealType, NewMeal, DEFAULT_FOOD_CATEGORIES,
};
use meal_assistant::db::{users, DatabaseClient, MealDb};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

use super::create_test_db;

#[tokio::test]
async fn test_open_creates_file_and_seeds_categories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data").join("meals.db");

    let db = MealDb::open(&path).await.unwrap();
    assert!(path.exists());

    let categories = meals::list_food_categories(db.pool()).await.unwrap();
    let names: Vec<&str> = categories.iter().map(|c| c.category_name.as_str()).collect();
    let expected: Vec<&str> = DEFAULT_FOOD_CATEGORIES.iter().map(|c| c.0).collect();
    assert_eq!(names, expected);

    db.close().await.unwrap();
}

#[tokio::test]
async fn test_reopen_keeps_data_and_does_not_reseed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meals.db");

    let db = MealDb::open(&path).await.unwrap();
    users::register_user(db.pool(), "小明").await.unwrap();
    db.close().await.unwrap();

    let db = MealDb::open(&path).await.unwrap();
    assert!(users::find_user_id(db.pool(), "小明").await.unwrap().is_some());
    assert_eq!(meals::list_food_categories(db.pool()).await.unwrap().len(), 8);
    db.close().await.unwrap();
}

#[tokio::test]
async fn test_user_registration() {
    let (db, _dir) = create_test_db().await;

    let id = users::register_user(db.pool(), "小明").await.unwrap();
    assert!(id.is_some());

    let duplicate = users::register_user(db.pool(), "小明").await.unwrap();
    assert_eq!(duplicate, None);

    assert_eq!(users::find_user_id(db.pool(), "小明").await.unwrap(), id);
    assert_eq!(users::find_user_id(db.pool(), "小红").await.unwrap(), None);

    let user = users::get_user_by_name(db.pool(), "小明").await.unwrap().unwrap();
    assert_eq!(Some(user.user_id), id);
    assert_eq!(user.user_name, "小明");
}

#[tokio::test]
async fn test_food_category_conflict() {
    let (db, _dir) = create_test_db().await;

    let id = meals::add_food_category(db.pool(), "饮品类", Some("补充水分"), None)
        .await
        .unwrap();
    assert!(id.is_some());

    let duplicate = meals::add_food_category(db.pool(), "蔬菜类", None, None)
        .await
        .unwrap();
    assert_eq!(duplicate, None);

    let categories = meals::list_food_categories(db.pool()).await.unwrap();
    let added = categories.last().unwrap();
    assert_eq!(added.category_name, "饮品类");
    assert_eq!(added.nutrition_value.as_deref(), Some("补充水分"));
    assert_eq!(added.recommended_frequency, None);
}

#[tokio::test]
async fn test_meals_are_listed_newest_first_with_category() {
    let (db, _dir) = create_test_db().await;
    let user_id = users::register_user(db.pool(), "小明").await.unwrap().unwrap();
    let fruit = meals::list_food_categories(db.pool())
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.category_name == "水果类")
        .unwrap();

    meals::add_meal(
        db.pool(),
        &NewMeal::new(user_id, MealType::Breakfast, "燕麦粥").on_date("2025-03-10"),
    )
    .await
    .unwrap();
    meals::add_meal(
        db.pool(),
        &NewMeal::new(user_id, MealType::Snack, "苹果")
            .with_category(fruit.category_id)
            .with_description("一个")
            .on_date("2025-03-12"),
    )
    .await
    .unwrap();
    meals::add_meal(
        db.pool(),
        &NewMeal::new(user_id, MealType::Dinner, "西红柿炒鸡蛋").on_date("2025-03-12"),
    )
    .await
    .unwrap();

    let all = meals::list_user_meals(db.pool(), user_id, &MealFilter::default())
        .await
        .unwrap();
    let foods: Vec<&str> = all.iter().map(|m| m.food_name.as_str()).collect();
    assert_eq!(foods, vec!["西红柿炒鸡蛋", "苹果", "燕麦粥"]);

    let apple = &all[1];
    assert_eq!(apple.meal_type, MealType::Snack);
    assert_eq!(apple.description.as_deref(), Some("一个"));
    assert_eq!(apple.category_name.as_deref(), Some("水果类"));
    assert_eq!(all[0].category_name, None);

    let filter = MealFilter {
        start_date: Some("2025-03-11".to_string()),
        end_date: Some("2025-03-12".to_string()),
    };
    let recent = meals::list_user_meals(db.pool(), user_id, &filter).await.unwrap();
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn test_meal_without_date_uses_today() {
    let (db, _dir) = create_test_db().await;
    let user_id = users::register_user(db.pool(), "小明").await.unwrap().unwrap();

    meals::add_meal(db.pool(), &NewMeal::new(user_id, MealType::Lunch, "米饭"))
        .await
        .unwrap();

    let listed = meals::list_user_meals(db.pool(), user_id, &MealFilter::default())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].meal_date.len(), "2025-03-12".len());
}

#[tokio::test]
async fn test_meal_for_unknown_user_is_rejected() {
    let (db, _dir) = create_test_db().await;

    let result = meals::add_meal(db.pool(), &NewMeal::new(999, MealType::Lunch, "米饭")).await;
    assert!(result.is_err());
}
