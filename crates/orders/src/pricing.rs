//! Line item pricing, bus penalties and headcount.

use serde::{Deserialize, Serialize};

use umrahops_catalog::ProductId;
use umrahops_core::{DomainError, DomainResult};
use umrahops_rules::BusinessRules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Hotel,
    Visa,
    Ticket,
    Bus,
}

/// Free-form descriptors carried with a line (room type, meal plan, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A line whose unit price is already known (explicit or resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedItem {
    pub item_type: ItemType,
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    /// Whole rupiah.
    pub unit_price: u64,
    #[serde(default)]
    pub meta: ItemMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub line_no: u32,
    pub item_type: ItemType,
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub unit_price: u64,
    pub subtotal: u64,
    pub penalty: u64,
    pub jamaah: u64,
    pub meta: ItemMeta,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: u64,
    pub penalty_amount: u64,
    pub total_amount: u64,
    pub total_jamaah: u64,
}

/// The business rules an order is priced under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPolicy {
    pub bus_min_pack: u32,
    pub bus_penalty: u64,
    pub require_hotel_for_visa: bool,
}

impl From<&BusinessRules> for OrderPolicy {
    fn from(rules: &BusinessRules) -> Self {
        Self {
            bus_min_pack: rules.bus_min_pack,
            bus_penalty: rules.bus_penalty_idr,
            require_hotel_for_visa: rules.require_hotel_for_visa,
        }
    }
}

/// Guests per room. Unknown room types count zero.
pub fn room_capacity(room_type: &str) -> u64 {
    match room_type.trim().to_ascii_lowercase().as_str() {
        "single" => 1,
        "double" | "twin" => 2,
        "triple" => 3,
        "quad" | "quadruple" => 4,
        "quint" | "quintuple" => 5,
        _ => 0,
    }
}

/// `|quantity - min_pack| * rate`, both directions penalized alike.
pub fn bus_penalty(quantity: u32, policy: &OrderPolicy) -> DomainResult<u64> {
    u64::from(quantity.abs_diff(policy.bus_min_pack))
        .checked_mul(policy.bus_penalty)
        .ok_or_else(overflow)
}

fn overflow() -> DomainError {
    DomainError::validation("order amount overflow")
}

/// Validate item composition before pricing.
pub fn check_composition(items: &[PricedItem], policy: &OrderPolicy) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation("order must contain at least one item"));
    }
    if let Some(pos) = items.iter().position(|i| i.quantity == 0) {
        return Err(DomainError::validation(format!("item {} quantity must be positive", pos + 1)));
    }
    if policy.require_hotel_for_visa {
        let has_visa = items.iter().any(|i| i.item_type == ItemType::Visa);
        let has_hotel = items.iter().any(|i| i.item_type == ItemType::Hotel);
        if has_visa && !has_hotel {
            return Err(DomainError::validation("visa requires a hotel item in the same order"));
        }
    }
    Ok(())
}

/// Price every line and sum the order totals.
pub fn compute_totals(items: &[PricedItem], policy: &OrderPolicy) -> DomainResult<(Vec<OrderItem>, OrderTotals)> {
    check_composition(items, policy)?;

    let mut lines = Vec::with_capacity(items.len());
    let mut totals = OrderTotals::default();

    for (idx, item) in items.iter().enumerate() {
        let quantity = u64::from(item.quantity);
        let subtotal = quantity.checked_mul(item.unit_price).ok_or_else(overflow)?;
        let (penalty, jamaah) = match item.item_type {
            ItemType::Bus => (bus_penalty(item.quantity, policy)?, quantity),
            ItemType::Hotel => {
                let capacity = item.meta.room_type.as_deref().map(room_capacity).unwrap_or(0);
                (0, quantity * capacity)
            }
            ItemType::Visa | ItemType::Ticket => (0, 0),
        };

        totals.subtotal = totals.subtotal.checked_add(subtotal).ok_or_else(overflow)?;
        totals.penalty_amount = totals.penalty_amount.checked_add(penalty).ok_or_else(overflow)?;
        totals.total_jamaah += jamaah;

        lines.push(OrderItem {
            line_no: idx as u32 + 1,
            item_type: item.item_type,
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal,
            penalty,
            jamaah,
            meta: item.meta.clone(),
        });
    }

    totals.total_amount = totals
        .subtotal
        .checked_add(totals.penalty_amount)
        .ok_or_else(overflow)?;

    Ok((lines, totals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> OrderPolicy {
        OrderPolicy {
            bus_min_pack: 35,
            bus_penalty: 500_000,
            require_hotel_for_visa: true,
        }
    }

    fn item(item_type: ItemType, quantity: u32, unit_price: u64) -> PricedItem {
        PricedItem {
            item_type,
            product_id: None,
            quantity,
            unit_price,
            meta: ItemMeta::default(),
        }
    }

    fn hotel(quantity: u32, room: &str, unit_price: u64) -> PricedItem {
        let mut i = item(ItemType::Hotel, quantity, unit_price);
        i.meta.room_type = Some(room.to_string());
        i
    }

    #[test]
    fn bus_over_min_pack_is_penalized() {
        let (lines, totals) = compute_totals(&[item(ItemType::Bus, 40, 100_000)], &policy()).unwrap();
        assert_eq!(lines[0].penalty, 2_500_000);
        assert_eq!(totals.penalty_amount, 2_500_000);
        assert_eq!(totals.subtotal, 4_000_000);
        assert_eq!(totals.total_amount, 6_500_000);
        assert_eq!(totals.total_jamaah, 40);
    }

    #[test]
    fn bus_under_min_pack_is_penalized_identically() {
        let p = policy();
        assert_eq!(bus_penalty(30, &p).unwrap(), bus_penalty(40, &p).unwrap());
        assert_eq!(bus_penalty(35, &p).unwrap(), 0);
    }

    #[test]
    fn hotel_headcount_uses_room_capacity() {
        let items = [hotel(2, "quad", 1_000_000), hotel(1, "Double", 800_000), hotel(3, "suite", 1)];
        let (_, totals) = compute_totals(&items, &policy()).unwrap();
        assert_eq!(totals.total_jamaah, 2 * 4 + 2);
        assert_eq!(totals.penalty_amount, 0);
    }

    #[test]
    fn visa_without_hotel_is_rejected_when_required() {
        let items = [item(ItemType::Visa, 10, 2_000_000)];
        let err = compute_totals(&items, &policy()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("visa requires")));

        let relaxed = OrderPolicy {
            require_hotel_for_visa: false,
            ..policy()
        };
        assert!(compute_totals(&items, &relaxed).is_ok());
    }

    #[test]
    fn empty_and_zero_quantity_are_rejected() {
        assert!(compute_totals(&[], &policy()).is_err());
        assert!(compute_totals(&[item(ItemType::Ticket, 0, 1)], &policy()).is_err());
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let err = compute_totals(&[item(ItemType::Ticket, u32::MAX, u64::MAX)], &policy()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    fn arb_item() -> impl Strategy<Value = PricedItem> {
        (
            prop_oneof![
                Just(ItemType::Hotel),
                Just(ItemType::Ticket),
                Just(ItemType::Bus),
            ],
            1u32..200,
            0u64..50_000_000,
        )
            .prop_map(|(t, q, p)| {
                let mut i = item(t, q, p);
                if t == ItemType::Hotel {
                    i.meta.room_type = Some("triple".to_string());
                }
                i
            })
    }

    proptest! {
        #[test]
        fn total_is_subtotal_plus_bus_penalties(items in prop::collection::vec(arb_item(), 1..12), min_pack in 1u32..60) {
            let p = OrderPolicy { bus_min_pack: min_pack, ..policy() };
            let (lines, totals) = compute_totals(&items, &p).unwrap();

            prop_assert_eq!(totals.total_amount, totals.subtotal + totals.penalty_amount);
            let expected_penalty: u64 = items
                .iter()
                .filter(|i| i.item_type == ItemType::Bus)
                .map(|i| u64::from(i.quantity.abs_diff(min_pack)) * p.bus_penalty)
                .sum();
            prop_assert_eq!(totals.penalty_amount, expected_penalty);
            prop_assert_eq!(totals.subtotal, lines.iter().map(|l| l.subtotal).sum::<u64>());
        }
    }
}
