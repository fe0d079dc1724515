use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A stable key that identifies a line independently of its position in the collection.
///
/// Line collections are compared as multisets grouped by this key, so the editing layer
/// is free to reorder lines without the change being reported as significant.
pub trait LineIdentity {
    type Key: Ord + Clone;

    fn identity(&self) -> Self::Key;
}

/// Represents a product line in an order draft.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Item {
    /// Remote line id. Zero until the line has been reconciled once.
    pub item_id: u64,
    pub product_id: u64,
    pub variation_id: u64,
    /// Line id of the bundle or composite this item belongs to.
    pub parent_item_id: Option<u64>,
    pub name: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub subtotal: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
}

impl Item {
    /// Creates a local, not yet reconciled item.
    pub fn new(product_id: u64, name: impl Into<String>, quantity: Decimal, price: Decimal) -> Self {
        Self {
            item_id: 0,
            product_id,
            variation_id: 0,
            parent_item_id: None,
            name: name.into(),
            quantity,
            price,
            subtotal: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }

    pub fn with_variation(mut self, variation_id: u64) -> Self {
        self.variation_id = variation_id;
        self
    }

    pub fn with_parent(mut self, parent_item_id: u64) -> Self {
        self.parent_item_id = Some(parent_item_id);
        self
    }

    pub fn is_synced(&self) -> bool {
        self.item_id != 0
    }
}

impl LineIdentity for Item {
    type Key = (u64, u64, u64, Option<u64>);

    fn identity(&self) -> Self::Key {
        (self.item_id, self.product_id, self.variation_id, self.parent_item_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeLine {
    pub id: u64,
    pub name: String,
    pub total: Decimal,
}

impl FeeLine {
    pub fn new(name: impl Into<String>, total: Decimal) -> Self {
        Self {
            id: 0,
            name: name.into(),
            total,
        }
    }
}

impl LineIdentity for FeeLine {
    type Key = (u64, String);

    fn identity(&self) -> Self::Key {
        (self.id, self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShippingLine {
    pub id: u64,
    pub method_id: String,
    pub method_title: String,
    pub total: Decimal,
}

impl ShippingLine {
    pub fn new(method_id: impl Into<String>, method_title: impl Into<String>, total: Decimal) -> Self {
        Self {
            id: 0,
            method_id: method_id.into(),
            method_title: method_title.into(),
            total,
        }
    }
}

impl LineIdentity for ShippingLine {
    type Key = (u64, String);

    fn identity(&self) -> Self::Key {
        (self.id, self.method_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CouponLine {
    pub code: String,
}

impl CouponLine {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

impl LineIdentity for CouponLine {
    type Key = String;

    fn identity(&self) -> Self::Key {
        self.code.to_lowercase()
    }
}

/// Compares two line collections without regard to their order.
///
/// Lines are grouped by [`LineIdentity`]; lines sharing a key are then compared as
/// a sorted multiset, so duplicated local lines (key collisions before the remote side
/// assigns ids) are still compared exactly.
pub fn same_lines<T>(a: &[T], b: &[T]) -> bool
where
    T: LineIdentity + Ord,
{
    if a.len() != b.len() {
        return false;
    }
    canonical(a) == canonical(b)
}

fn canonical<T>(lines: &[T]) -> Vec<(T::Key, &T)>
where
    T: LineIdentity + Ord,
{
    let mut keyed: Vec<(T::Key, &T)> = lines.iter().map(|line| (line.identity(), line)).collect();
    keyed.sort();
    keyed
}
