//! Policies deciding whether a draft transition warrants a remote recompute.
//!
//! Both policies ignore the volatile fields of a draft (`number`, `date_modified`,
//! `local_revision`) and compare line collections by identity, never by position.

mod any_change;
mod price_affecting;

pub use any_change::AnyChangePolicy;
pub use price_affecting::PriceAffectingPolicy;

use crate::domain::{same_lines, OrderDraft};

/// Decides whether moving from `previous` to `next` is significant enough to sync.
///
/// Implementations must be pure and deterministic.
pub trait SyncPolicy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn is_significant(&self, previous: &OrderDraft, next: &OrderDraft) -> bool;
}

impl<P: SyncPolicy + ?Sized> SyncPolicy for Box<P> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_significant(&self, previous: &OrderDraft, next: &OrderDraft) -> bool {
        (**self).is_significant(previous, next)
    }
}

/// Items, fees, shipping and coupons: everything that moves the order total.
fn price_lines_equal(a: &OrderDraft, b: &OrderDraft) -> bool {
    same_lines(&a.items, &b.items)
        && same_lines(&a.fee_lines, &b.fee_lines)
        && same_lines(&a.shipping_lines, &b.shipping_lines)
        && same_lines(&a.coupon_lines, &b.coupon_lines)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn policies() -> Vec<Box<dyn SyncPolicy>> {
        vec![Box::new(AnyChangePolicy), Box::new(PriceAffectingPolicy)]
    }

    #[test]
    fn identical_drafts_are_never_significant() {
        let draft = populated();
        for policy in policies() {
            assert!(!policy.is_significant(&draft, &draft.clone()), "{}", policy.name());
        }
    }

    #[test]
    fn item_change_is_significant_for_both_policies() {
        let before = populated();
        let mut after = before.clone();
        after.items[0].quantity = Decimal::TEN;
        for policy in policies() {
            assert!(policy.is_significant(&before, &after), "{}", policy.name());
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: reordering lines never makes a transition significant.
        #[test]
        fn line_reordering_is_not_significant(
            rotate_items in 0usize..2,
            reverse_lines in any::<bool>(),
        ) {
            let before = populated();
            let mut after = before.clone();
            after.items.rotate_left(rotate_items);
            if reverse_lines {
                after.fee_lines.reverse();
                after.shipping_lines.reverse();
                after.coupon_lines.reverse();
            }
            for policy in policies() {
                prop_assert!(!policy.is_significant(&before, &after));
            }
        }

        /// Property: significance is symmetric and deterministic.
        #[test]
        fn significance_is_symmetric(quantity in 1i64..50, note in "[a-z ]{0,12}") {
            let before = populated();
            let mut after = before.clone().with_note(note);
            after.items[1].quantity = Decimal::from(quantity);
            for policy in policies() {
                let forward = policy.is_significant(&before, &after);
                prop_assert_eq!(forward, policy.is_significant(&after, &before));
                prop_assert_eq!(forward, policy.is_significant(&before, &after));
            }
        }
    }
}
