use crate::workflows::orders::resolver::ResolvedLine;

/// Expected weight of a resolved order: catalog unit weight times
/// quantity for every product, plus the same for each of its modifiers.
/// Modifier weights are signed, so a removal subtracts.
///
/// Auto-created catalog rows carry a zero weight and contribute nothing
/// until an operator corrects them.
pub(crate) fn expected_weight_grams(lines: &[ResolvedLine]) -> i64 {
    lines
        .iter()
        .map(|line| {
            let modifier_grams: i64 = line
                .modifiers
                .iter()
                .map(|(_, row)| row.unit_weight_grams * line.item.quantity)
                .sum();
            line.product.unit_weight_grams * line.item.quantity + modifier_grams
        })
        .sum()
}
