//! Catalog food records and the offer-listing predicates
use std::fmt;

use chrono::Utc;

use crate::trade::TimeStamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub enum MealType {
    #[n(0)]
    Breakfast,
    #[n(1)]
    Lunch,
    #[n(2)]
    Dinner,
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
        };
        f.write_str(name)
    }
}

/// An item in the admin-owned food catalog.
#[derive(Debug, Clone, PartialEq, minicbor::Encode, minicbor::Decode)]
pub struct Food {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub calories: u32,
    #[n(3)]
    pub protein: u32,
    #[n(4)]
    pub carbs: u32,
    #[n(5)]
    pub fat: u32,
    #[n(6)]
    pub meal_type: MealType,
    #[n(7)]
    pub available_date: String,
    #[n(8)]
    pub available_time: String,
    /// Empty means no warnings; the legacy `"none"` sentinel is normalized
    /// away on construction.
    #[n(9)]
    pub allergy_warnings: Vec<String>,
    #[n(10)]
    pub nutrients_importance: String,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
}

/// Caller-supplied fields for creating or replacing a catalog item.
#[derive(Debug, Clone)]
pub struct NewFood {
    pub name: String,
    pub calories: u32,
    pub protein: u32,
    pub carbs: u32,
    pub fat: u32,
    pub meal_type: MealType,
    pub available_date: String,
    pub available_time: String,
    pub allergy_warnings: Vec<String>,
    pub nutrients_importance: String,
}

impl Food {
    pub fn new(id: String, fields: NewFood) -> Self {
        Self {
            id,
            name: fields.name,
            calories: fields.calories,
            protein: fields.protein,
            carbs: fields.carbs,
            fat: fields.fat,
            meal_type: fields.meal_type,
            available_date: fields.available_date,
            available_time: fields.available_time,
            allergy_warnings: normalize_allergy_tags(fields.allergy_warnings),
            nutrients_importance: fields.nutrients_importance,
            created_at: TimeStamp::new(),
        }
    }
}

/// Drop the `"none"` placeholder tag the legacy data used for "no warnings".
pub fn normalize_allergy_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .filter(|tag| !tag.eq_ignore_ascii_case("none") && !tag.trim().is_empty())
        .collect()
}

/// The closed set of category predicates offered by the browse UI.
///
/// `Vegetarian` is a name-substring heuristic carried over from the product:
/// it only knows about chicken. Kept as-is rather than generalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    HighProtein,
    LowCalorie,
    Vegetarian,
}

impl Category {
    pub fn matches(self, food: &Food) -> bool {
        match self {
            Category::HighProtein => food.protein >= 20,
            Category::LowCalorie => food.calories <= 300,
            Category::Vegetarian => !food.name.contains("Chicken"),
        }
    }
}

/// Predicates applied when listing available public offers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferFilters {
    pub meal: Option<MealType>,
    pub category: Option<Category>,
}

impl OfferFilters {
    pub fn accepts(&self, food: &Food) -> bool {
        if let Some(meal) = self.meal {
            if food.meal_type != meal {
                return false;
            }
        }
        if let Some(category) = self.category {
            if !category.matches(food) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(name: &str, calories: u32, protein: u32, meal_type: MealType) -> Food {
        Food::new(
            format!("food_{name}"),
            NewFood {
                name: name.to_string(),
                calories,
                protein,
                carbs: 30,
                fat: 10,
                meal_type,
                available_date: "2025-03-20".into(),
                available_time: "12:30".into(),
                allergy_warnings: vec![],
                nutrients_importance: String::new(),
            },
        )
    }

    #[test]
    fn none_sentinel_normalizes_to_empty() {
        assert!(normalize_allergy_tags(vec!["none".into()]).is_empty());
        assert!(normalize_allergy_tags(vec!["None".into(), "".into()]).is_empty());
        assert_eq!(
            normalize_allergy_tags(vec!["dairy".into(), "none".into()]),
            vec!["dairy".to_string()]
        );
    }

    #[test]
    fn category_predicates() {
        let sandwich = food("Grilled Chicken Sandwich", 350, 25, MealType::Lunch);
        let parfait = food("Greek Yogurt Parfait", 280, 15, MealType::Breakfast);

        assert!(Category::HighProtein.matches(&sandwich));
        assert!(!Category::HighProtein.matches(&parfait));
        assert!(Category::LowCalorie.matches(&parfait));
        assert!(!Category::LowCalorie.matches(&sandwich));
        assert!(!Category::Vegetarian.matches(&sandwich));
        assert!(Category::Vegetarian.matches(&parfait));
    }

    #[test]
    fn filters_combine_meal_and_category() {
        let stir_fry = food("Vegetable Stir Fry", 320, 12, MealType::Dinner);

        let filters = OfferFilters {
            meal: Some(MealType::Dinner),
            category: Some(Category::Vegetarian),
        };
        assert!(filters.accepts(&stir_fry));

        let filters = OfferFilters {
            meal: Some(MealType::Lunch),
            ..Default::default()
        };
        assert!(!filters.accepts(&stir_fry));
    }
}
