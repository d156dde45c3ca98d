use uuid::Uuid;

use crate::workflows::orders::domain::OrderItem;
use crate::workflows::orders::verification::{
    analyze, MissingItemGuess, RecommendedAction, WeightStatus, DEFAULT_TOLERANCE_GRAMS,
};

fn order_item(name: &str) -> OrderItem {
    OrderItem {
        id: Uuid::new_v4(),
        catalog_product_id: Uuid::new_v4(),
        name: name.to_string(),
        quantity: 1,
        total_price_cents: 350,
        modifiers: Vec::new(),
    }
}

#[test]
fn within_tolerance_is_perfect() {
    let verdict = analyze(500, 450, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(verdict.status, WeightStatus::Perfect);
    assert_eq!(verdict.action, RecommendedAction::Ready);
    assert_eq!(verdict.delta_grams, 50);
    assert!(verdict.suggestion.is_none());
}

#[test]
fn tolerance_boundary_is_inclusive() {
    let at_boundary = analyze(550, 450, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(at_boundary.status, WeightStatus::Perfect);

    let past_boundary = analyze(551, 450, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(past_boundary.status, WeightStatus::Overweight);
}

#[test]
fn overweight_past_tolerance_asks_for_review() {
    let verdict = analyze(600, 450, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(verdict.status, WeightStatus::Overweight);
    assert_eq!(verdict.action, RecommendedAction::Review);
    assert_eq!(verdict.delta_grams, 150);
    assert!(verdict.suggestion.is_none());
}

#[test]
fn underweight_past_tolerance_asks_for_a_reweigh() {
    let verdict = analyze(300, 450, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(verdict.status, WeightStatus::Underweight);
    assert_eq!(verdict.action, RecommendedAction::ReWeigh);
    assert_eq!(verdict.delta_grams, -150);
    assert!(verdict.suggestion.is_some());
}

#[test]
fn suggestion_names_the_line_item_closest_to_the_missing_mass() {
    let items = vec![order_item("Carnitas Taco"), order_item("Large Burrito")];
    let verdict = analyze(300, 450, &items, DEFAULT_TOLERANCE_GRAMS);

    assert_eq!(
        verdict.suggestion,
        Some(MissingItemGuess {
            name: "Carnitas Taco".to_string(),
            confidence: Some(89),
        })
    );
}

#[test]
fn suggestion_falls_back_to_a_weight_band_when_nothing_is_credible() {
    // 150g missing against a 500g typical weight scores exactly at the
    // floor, which is not enough.
    let items = vec![order_item("Water Bottle")];
    let verdict = analyze(300, 450, &items, DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(
        verdict.suggestion,
        Some(MissingItemGuess {
            name: "a standard menu item".to_string(),
            confidence: None,
        })
    );

    let verdict = analyze(0, 150, &[], DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(
        verdict.suggestion.map(|guess| guess.name),
        Some("a standard menu item".to_string())
    );
}

#[test]
fn weight_bands_scale_with_the_missing_mass() {
    let band = |missing: i64| {
        analyze(0, missing, &[], 10)
            .suggestion
            .expect("underweight carries a suggestion")
            .name
    };

    assert_eq!(band(80), "a small side or condiment");
    assert_eq!(band(200), "a standard menu item");
    assert_eq!(band(400), "a large item or a couple of small ones");
    assert_eq!(band(900), "a large item or multiple items");
}

#[test]
fn unknown_names_fall_back_to_the_default_unit_weight() {
    // 170g missing matches the fallback estimate exactly.
    let items = vec![order_item("Chef Special")];
    let verdict = analyze(280, 450, &items, DEFAULT_TOLERANCE_GRAMS);
    assert_eq!(
        verdict.suggestion,
        Some(MissingItemGuess {
            name: "Chef Special".to_string(),
            confidence: Some(100),
        })
    );
}
