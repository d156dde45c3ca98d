use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for the tenant owning every row in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for order aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Sales channel the order arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Delivery,
    Takeout,
}

impl Channel {
    pub const fn label(self) -> &'static str {
        match self {
            Channel::Delivery => "delivery",
            Channel::Takeout => "takeout",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "delivery" => Some(Channel::Delivery),
            "takeout" => Some(Channel::Takeout),
            _ => None,
        }
    }
}

/// Lifecycle status of an order.
///
/// `pending_weight → weighed → completed` is the happy path;
/// `ready_for_lockers` feeds the batch-completion path; `cancelled` and
/// `archived` absorb orders that leave the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    PendingWeight,
    Weighed,
    ReadyForLockers,
    Completed,
    Cancelled,
    Archived,
}

impl OrderStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OrderStatus::PendingWeight => "pending_weight",
            OrderStatus::Weighed => "weighed",
            OrderStatus::ReadyForLockers => "ready_for_lockers",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending_weight" => Some(OrderStatus::PendingWeight),
            "weighed" => Some(OrderStatus::Weighed),
            "ready_for_lockers" => Some(OrderStatus::ReadyForLockers),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "archived" => Some(OrderStatus::Archived),
            _ => None,
        }
    }

    /// True while the order is still moving toward dispatch.
    pub const fn is_open(self) -> bool {
        matches!(
            self,
            OrderStatus::PendingWeight | OrderStatus::Weighed | OrderStatus::ReadyForLockers
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Kind discriminator for catalog entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    Product,
    Modifier,
}

impl CatalogKind {
    pub const fn label(self) -> &'static str {
        match self {
            CatalogKind::Product => "product",
            CatalogKind::Modifier => "modifier",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "product" => Some(CatalogKind::Product),
            "modifier" => Some(CatalogKind::Modifier),
            _ => None,
        }
    }
}

/// A tenant catalog entry: a product or a modifier.
///
/// Weight is signed because a modifier may remove mass ("no rice").
/// The normalized name is the matching key; the store enforces its
/// uniqueness per tenant and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub kind: CatalogKind,
    pub name: String,
    pub normalized_name: String,
    pub unit_price_cents: i64,
    pub unit_weight_grams: i64,
}

/// Customer contact details captured at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Structured payload produced by the external text-structuring
/// collaborator. Persisted verbatim as the order snapshot, so the shape
/// is fixed here rather than carried as loose JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOrder {
    pub channel: Channel,
    pub check_number: String,
    pub customer: Customer,
    pub items: Vec<StructuredItem>,
    pub subtotal: f64,
    pub tax: f64,
    pub total: f64,
}

/// One extracted line item. `price` is the line total in major units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredItem {
    pub name: String,
    pub quantity: i64,
    pub price: f64,
    #[serde(default)]
    pub modifiers: Vec<StructuredModifier>,
}

/// One extracted modifier. `price` is the modifier total in major units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredModifier {
    pub name: String,
    pub price: f64,
}

/// Round a monetary amount in major units to integer minor units (cents).
///
/// This is the only place floating point touches money; everything
/// persisted is integer cents.
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Per-unit price from a line total, rounding half away from zero.
pub fn per_unit_minor_units(line_total_cents: i64, quantity: i64) -> i64 {
    if quantity <= 1 {
        return line_total_cents;
    }
    let unit = (line_total_cents.abs() + quantity / 2) / quantity;
    if line_total_cents < 0 {
        -unit
    } else {
        unit
    }
}

/// The order aggregate root, loaded with its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub channel: Channel,
    pub check_number: String,
    pub customer: Customer,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    /// Fixed at creation time; never recomputed by lifecycle transitions.
    pub expected_weight_grams: i64,
    pub actual_weight_grams: Option<i64>,
    pub delta_weight_grams: Option<i64>,
    pub raw_input: String,
    pub structured_snapshot: StructuredOrder,
    pub weight_verified_at: Option<DateTime<Utc>>,
    pub visual_status: Option<VisualStatus>,
    pub visual_result: Option<VisualOutcome>,
    pub visual_verified_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub archived_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    pub fn view(&self) -> OrderView {
        OrderView {
            id: self.id,
            status: self.status.label(),
            channel: self.channel.label(),
            check_number: self.check_number.clone(),
            customer: self.customer.clone(),
            subtotal_cents: self.subtotal_cents,
            tax_cents: self.tax_cents,
            total_cents: self.total_cents,
            expected_weight_grams: self.expected_weight_grams,
            actual_weight_grams: self.actual_weight_grams,
            delta_weight_grams: self.delta_weight_grams,
            weight_verified_at: self.weight_verified_at,
            visual_status: self.visual_status.map(VisualStatus::label),
            visual_verified_at: self.visual_verified_at,
            archived_at: self.archived_at,
            archived_reason: self.archived_reason.clone(),
            items: self.items.iter().map(OrderItem::view).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// One persisted line item. `name` keeps the original extracted text even
/// if the bound catalog product is later renamed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub catalog_product_id: Uuid,
    pub name: String,
    pub quantity: i64,
    pub total_price_cents: i64,
    pub modifiers: Vec<OrderItemModifier>,
}

impl OrderItem {
    fn view(&self) -> OrderItemView {
        OrderItemView {
            name: self.name.clone(),
            quantity: self.quantity,
            total_price_cents: self.total_price_cents,
            modifiers: self
                .modifiers
                .iter()
                .map(|modifier| OrderItemModifierView {
                    name: modifier.name.clone(),
                    total_price_cents: modifier.total_price_cents,
                })
                .collect(),
        }
    }
}

/// One persisted modifier row. The catalog reference is nullable so that
/// deleting a modifier from the catalog never destroys order history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemModifier {
    pub id: Uuid,
    pub catalog_modifier_id: Option<Uuid>,
    pub name: String,
    pub total_price_cents: i64,
}

/// Sanitized order representation returned by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub status: &'static str,
    pub channel: &'static str,
    pub check_number: String,
    pub customer: Customer,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub expected_weight_grams: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_weight_grams: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_weight_grams: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visual_verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_reason: Option<String>,
    pub items: Vec<OrderItemView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemView {
    pub name: String,
    pub quantity: i64,
    pub total_price_cents: i64,
    pub modifiers: Vec<OrderItemModifierView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemModifierView {
    pub name: String,
    pub total_price_cents: i64,
}

/// Outcome bucket of the image-based verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualStatus {
    Verified,
    MissingItems,
    ExtraItems,
    Uncertain,
    WrongImage,
}

impl VisualStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VisualStatus::Verified => "verified",
            VisualStatus::MissingItems => "missing_items",
            VisualStatus::ExtraItems => "extra_items",
            VisualStatus::Uncertain => "uncertain",
            VisualStatus::WrongImage => "wrong_image",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "verified" => Some(VisualStatus::Verified),
            "missing_items" => Some(VisualStatus::MissingItems),
            "extra_items" => Some(VisualStatus::ExtraItems),
            "uncertain" => Some(VisualStatus::Uncertain),
            "wrong_image" => Some(VisualStatus::WrongImage),
            _ => None,
        }
    }
}

/// Structured response of the external vision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionVerdict {
    #[serde(rename = "match")]
    pub matched: bool,
    pub confidence: u8,
    #[serde(default)]
    pub identified_items: Vec<String>,
    #[serde(default)]
    pub missing_items: Vec<String>,
    #[serde(default)]
    pub extra_items: Vec<String>,
    #[serde(default)]
    pub wrong_order: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Full visual-verification result persisted on the order, including the
/// submitted image references so the check can be reviewed later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualOutcome {
    pub status: VisualStatus,
    pub verdict: VisionVerdict,
    pub images: Vec<String>,
}

/// Target status when recording a weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeighTarget {
    /// Straight to `completed` (the default path).
    #[default]
    Completed,
    /// Stop at `weighed` when an extra gate is wanted before completion.
    Weighed,
}

/// One row of the append-only audit ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub id: i64,
    pub order_id: OrderId,
    #[serde(flatten)]
    pub data: OrderEventData,
    #[serde(default)]
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Event payloads, one fixed schema per event type.
///
/// The ledger is the sole audit trail: each variant carries enough to
/// reconstruct what happened without consulting the mutable order row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEventData {
    Created {
        item_count: i64,
        expected_weight_grams: i64,
        channel: Channel,
    },
    WeightVerified {
        actual_weight_grams: i64,
        expected_weight_grams: i64,
        delta_weight_grams: i64,
        outcome: crate::workflows::orders::verification::WeightStatus,
    },
    VisualVerified {
        status: VisualStatus,
        confidence: u8,
        missing_items: Vec<String>,
        extra_items: Vec<String>,
        matched: bool,
        wrong_order: bool,
    },
    StatusChanged {
        from: OrderStatus,
        to: OrderStatus,
        #[serde(default)]
        reason: Option<String>,
    },
    Archived {
        reason: String,
    },
    Unarchived {
        restored_to: OrderStatus,
    },
}

impl OrderEventData {
    /// The `event_type` column value for this payload.
    pub const fn kind(&self) -> &'static str {
        match self {
            OrderEventData::Created { .. } => "created",
            OrderEventData::WeightVerified { .. } => "weight_verified",
            OrderEventData::VisualVerified { .. } => "visual_verified",
            OrderEventData::StatusChanged { .. } => "status_changed",
            OrderEventData::Archived { .. } => "archived",
            OrderEventData::Unarchived { .. } => "unarchived",
        }
    }
}

/// How extracted names are matched against catalog candidates during bulk
/// resolution. `Substring` preserves the historical loose behavior and
/// stays the default until the product decision lands; `Exact` requires
/// normalized equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    Exact,
    Substring,
}

impl MatchMode {
    pub const fn label(self) -> &'static str {
        match self {
            MatchMode::Exact => "exact",
            MatchMode::Substring => "substring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(MatchMode::Exact),
            "substring" => Some(MatchMode::Substring),
            _ => None,
        }
    }
}

/// Per-tenant engine dials, read from the store with these defaults when
/// the tenant has no row.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub tolerance_grams: i64,
    pub match_mode: MatchMode,
    pub visual_prompt_template: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tolerance_grams: crate::workflows::orders::verification::DEFAULT_TOLERANCE_GRAMS,
            match_mode: MatchMode::Substring,
            visual_prompt_template: None,
        }
    }
}
