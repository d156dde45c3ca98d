//! Weight-deviation analysis. Pure: classification never touches the
//! store and never moves an order between statuses on its own.

use serde::{Deserialize, Serialize};

use crate::workflows::orders::domain::OrderItem;
use crate::workflows::orders::normalizer::normalize_name;

/// Tolerance applied when a tenant has not configured one.
pub const DEFAULT_TOLERANCE_GRAMS: i64 = 100;

/// Suggestions scoring at or below this fall back to the weight band.
const SUGGESTION_CONFIDENCE_FLOOR: i64 = 30;

/// Fallback unit weight for line items no keyword matches.
const DEFAULT_UNIT_WEIGHT_GRAMS: i64 = 170;

/// Typical unit weights for common menu items, matched by keyword against
/// the normalized line-item name. First match wins, so compound dishes
/// are listed before their components.
const CANONICAL_UNIT_WEIGHTS: &[(&str, i64)] = &[
    ("bowl", 510),
    ("burrito", 450),
    ("quesadilla", 400),
    ("nachos", 400),
    ("salad", 340),
    ("soup", 340),
    ("wrap", 310),
    ("sandwich", 280),
    ("taco", 170),
    ("dessert", 140),
    ("side", 140),
    ("chips", 115),
    ("guacamole", 115),
    ("queso", 115),
    ("salsa", 85),
    ("drink", 500),
    ("soda", 500),
    ("water", 500),
];

/// Deviation bucket for a recorded weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightStatus {
    Perfect,
    Underweight,
    Overweight,
}

impl WeightStatus {
    pub const fn label(self) -> &'static str {
        match self {
            WeightStatus::Perfect => "perfect",
            WeightStatus::Underweight => "underweight",
            WeightStatus::Overweight => "overweight",
        }
    }
}

/// Suggested operator action. Advisory only; the lifecycle never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Ready,
    #[serde(rename = "re-weigh")]
    ReWeigh,
    Review,
}

impl RecommendedAction {
    pub const fn label(self) -> &'static str {
        match self {
            RecommendedAction::Ready => "ready",
            RecommendedAction::ReWeigh => "re-weigh",
            RecommendedAction::Review => "review",
        }
    }
}

/// Result of analyzing one recorded weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightVerdict {
    pub status: WeightStatus,
    pub action: RecommendedAction,
    pub delta_grams: i64,
    pub tolerance_grams: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<MissingItemGuess>,
}

/// Best guess at what is missing from an underweight order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MissingItemGuess {
    pub name: String,
    /// 0-100 when derived from a line item; absent for the generic
    /// weight-band fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i64>,
}

/// Classify `actual` against `expected` within `tolerance`.
pub fn analyze(
    actual_grams: i64,
    expected_grams: i64,
    items: &[OrderItem],
    tolerance_grams: i64,
) -> WeightVerdict {
    let delta = actual_grams - expected_grams;

    if delta.abs() <= tolerance_grams {
        return WeightVerdict {
            status: WeightStatus::Perfect,
            action: RecommendedAction::Ready,
            delta_grams: delta,
            tolerance_grams,
            suggestion: None,
        };
    }

    if delta > 0 {
        return WeightVerdict {
            status: WeightStatus::Overweight,
            action: RecommendedAction::Review,
            delta_grams: delta,
            tolerance_grams,
            suggestion: None,
        };
    }

    WeightVerdict {
        status: WeightStatus::Underweight,
        action: RecommendedAction::ReWeigh,
        delta_grams: delta,
        tolerance_grams,
        suggestion: Some(guess_missing_item(-delta, items)),
    }
}

/// Score every line item by how closely its typical unit weight explains
/// the missing mass; take the best scorer, or a weight band when nothing
/// is credible.
fn guess_missing_item(missing_grams: i64, items: &[OrderItem]) -> MissingItemGuess {
    let mut best: Option<(i64, &OrderItem)> = None;

    for item in items {
        let estimate = estimated_unit_weight(&item.name);
        let confidence = (100 - (missing_grams - estimate).abs() * 100 / estimate).max(0);
        if best.map_or(true, |(current, _)| confidence > current) {
            best = Some((confidence, item));
        }
    }

    match best {
        Some((confidence, item)) if confidence > SUGGESTION_CONFIDENCE_FLOOR => MissingItemGuess {
            name: item.name.clone(),
            confidence: Some(confidence),
        },
        _ => MissingItemGuess {
            name: weight_band_suggestion(missing_grams).to_string(),
            confidence: None,
        },
    }
}

fn estimated_unit_weight(name: &str) -> i64 {
    let normalized = normalize_name(name);
    CANONICAL_UNIT_WEIGHTS
        .iter()
        .find(|(keyword, _)| normalized.contains(keyword))
        .map(|(_, grams)| *grams)
        .unwrap_or(DEFAULT_UNIT_WEIGHT_GRAMS)
}

fn weight_band_suggestion(missing_grams: i64) -> &'static str {
    match missing_grams {
        m if m < 115 => "a small side or condiment",
        m if m < 230 => "a standard menu item",
        m if m < 455 => "a large item or a couple of small ones",
        _ => "a large item or multiple items",
    }
}
