//! Bulk catalog resolution. Every extracted name is bound to a catalog
//! row; names the tenant has never sold become placeholder rows inside
//! the caller's transaction, so they commit or roll back with the order.

use std::collections::BTreeMap;

use crate::store::{StoreError, TenantTx};
use crate::workflows::orders::domain::{
    per_unit_minor_units, to_minor_units, CatalogItem, CatalogKind, MatchMode, StructuredItem,
    StructuredModifier,
};
use crate::workflows::orders::normalizer::normalize_name;

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("line item '{name}' could not be matched against the catalog or created")]
    Unresolved { name: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One extracted line bound to its catalog rows.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedLine {
    pub(crate) item: StructuredItem,
    pub(crate) product: CatalogItem,
    pub(crate) modifiers: Vec<(StructuredModifier, CatalogItem)>,
}

/// Bind every line of the payload to catalog rows, creating what is
/// missing. Creation dedupes by normalized name, so a name repeated
/// across lines yields one row.
pub(crate) async fn resolve_lines(
    tx: &mut TenantTx,
    items: &[StructuredItem],
    mode: MatchMode,
) -> Result<Vec<ResolvedLine>, ResolutionError> {
    let mut products = tx.catalog_items(CatalogKind::Product).await?;
    let mut modifiers = tx.catalog_items(CatalogKind::Modifier).await?;

    let mut missing_products: BTreeMap<String, PendingRow> = BTreeMap::new();
    let mut missing_modifiers: BTreeMap<String, PendingRow> = BTreeMap::new();

    for item in items {
        let key = normalize_name(&item.name);
        if find_match(&products, &key, mode).is_none() {
            missing_products.entry(key).or_insert_with(|| PendingRow {
                name: item.name.clone(),
                // New products inherit the line's per-unit price.
                unit_price_cents: per_unit_minor_units(to_minor_units(item.price), item.quantity),
            });
        }

        for modifier in &item.modifiers {
            let key = normalize_name(&modifier.name);
            if find_match(&modifiers, &key, mode).is_none() {
                missing_modifiers.entry(key).or_insert_with(|| PendingRow {
                    name: modifier.name.clone(),
                    unit_price_cents: to_minor_units(modifier.price),
                });
            }
        }
    }

    // Placeholder rows carry zero weight until an operator corrects them.
    for (key, pending) in &missing_products {
        let row = tx
            .insert_catalog_item(
                CatalogKind::Product,
                &pending.name,
                key,
                pending.unit_price_cents,
                0,
            )
            .await?;
        products.push(row);
    }
    for (key, pending) in &missing_modifiers {
        let row = tx
            .insert_catalog_item(
                CatalogKind::Modifier,
                &pending.name,
                key,
                pending.unit_price_cents,
                0,
            )
            .await?;
        modifiers.push(row);
    }

    // Second pass must bind everything; a miss here is a logic defect and
    // aborts the order instead of passing through unpriced.
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let key = normalize_name(&item.name);
        let product = find_match(&products, &key, mode)
            .ok_or_else(|| ResolutionError::Unresolved {
                name: item.name.clone(),
            })?
            .clone();

        let mut bound = Vec::with_capacity(item.modifiers.len());
        for modifier in &item.modifiers {
            let key = normalize_name(&modifier.name);
            let row = find_match(&modifiers, &key, mode)
                .ok_or_else(|| ResolutionError::Unresolved {
                    name: modifier.name.clone(),
                })?
                .clone();
            bound.push((modifier.clone(), row));
        }

        lines.push(ResolvedLine {
            item: item.clone(),
            product,
            modifiers: bound,
        });
    }

    Ok(lines)
}

struct PendingRow {
    name: String,
    unit_price_cents: i64,
}

/// Exact normalized equality first. `Substring` widens to containment in
/// either direction when no exact row exists, which keeps the historical
/// behavior where "Burrito" binds to "Burrito Grande".
fn find_match<'a>(
    candidates: &'a [CatalogItem],
    key: &str,
    mode: MatchMode,
) -> Option<&'a CatalogItem> {
    if key.is_empty() {
        return None;
    }

    if let Some(exact) = candidates
        .iter()
        .find(|candidate| candidate.normalized_name == key)
    {
        return Some(exact);
    }

    match mode {
        MatchMode::Exact => None,
        MatchMode::Substring => candidates.iter().find(|candidate| {
            !candidate.normalized_name.is_empty()
                && (candidate.normalized_name.contains(key)
                    || key.contains(candidate.normalized_name.as_str()))
        }),
    }
}
