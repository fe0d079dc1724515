use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, instrument};

use crate::domain::OrderDraft;

/// Latest-value holder for the order under edit.
///
/// The editing layer writes through [`update`](Self::update); sync engines observe it
/// through [`subscribe`](Self::subscribe). Every effective user edit bumps
/// `local_revision`, which is how stale reconcile results are recognised on write-back.
#[derive(Clone)]
pub struct DraftSource {
    sender: Arc<watch::Sender<OrderDraft>>,
}

impl DraftSource {
    pub fn new(initial: OrderDraft) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> OrderDraft {
        self.sender.borrow().clone()
    }

    pub fn revision(&self) -> u64 {
        self.sender.borrow().local_revision
    }

    pub fn subscribe(&self) -> watch::Receiver<OrderDraft> {
        self.sender.subscribe()
    }

    /// Applies a user edit. Returns `false` and notifies nobody when the edit changes nothing.
    pub fn update(&self, edit: impl FnOnce(&mut OrderDraft)) -> bool {
        self.sender.send_if_modified(|draft| {
            let before = draft.clone();
            edit(draft);
            if *draft == before {
                return false;
            }
            draft.local_revision = before.local_revision + 1;
            true
        })
    }

    /// Replaces the whole draft as a single user edit.
    pub fn replace(&self, draft: OrderDraft) -> bool {
        self.update(move |current| {
            let revision = current.local_revision;
            *current = OrderDraft {
                local_revision: revision,
                ..draft
            };
        })
    }

    /// Writes a reconciled order back.
    ///
    /// When the order's `local_revision` still matches the draft, the draft becomes
    /// `merge(current, reconciled)`. The engine stamps a result with the latest revision
    /// when only insignificant edits followed the dispatch, so those edits must survive
    /// `merge`. Otherwise the local edits win and only the remote identity (order id,
    /// line ids) is adopted. Write-backs never bump the revision.
    #[instrument(skip(self, reconciled, merge), fields(order_id = reconciled.id, revision = reconciled.local_revision))]
    pub fn apply_reconciled(
        &self,
        reconciled: OrderDraft,
        merge: impl FnOnce(&OrderDraft, OrderDraft) -> OrderDraft,
    ) -> bool {
        self.sender.send_if_modified(|current| {
            let revision = current.local_revision;
            let next = if revision == reconciled.local_revision {
                OrderDraft {
                    local_revision: revision,
                    ..merge(current, reconciled)
                }
            } else {
                debug!(current_revision = revision, "Draft edited since dispatch, adopting remote identity only");
                let mut rebased = current.clone();
                rebased.adopt_remote_identity(&reconciled);
                rebased
            };
            if next == *current {
                return false;
            }
            *current = next;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::domain::Item;

    fn take_remote(_: &OrderDraft, reconciled: OrderDraft) -> OrderDraft {
        reconciled
    }

    #[test]
    fn effective_edits_bump_the_revision() {
        let source = DraftSource::new(OrderDraft::empty());
        let mut watcher = source.subscribe();

        assert!(source.update(|draft| draft.customer_note = "Hi".into()));
        assert_eq!(source.revision(), 1);
        assert!(watcher.has_changed().unwrap());

        watcher.borrow_and_update();
        assert!(!source.update(|draft| draft.customer_note = "Hi".into()));
        assert_eq!(source.revision(), 1);
        assert!(!watcher.has_changed().unwrap());
    }

    #[test]
    fn replace_counts_as_one_edit() {
        let source = DraftSource::new(OrderDraft::empty());
        source.replace(OrderDraft::empty().with_note("a"));
        source.replace(OrderDraft::empty().with_note("b"));

        assert_eq!(source.revision(), 2);
        assert_eq!(source.current().customer_note, "b");
    }

    #[test]
    fn matching_revision_takes_the_reconciled_order() {
        let source = DraftSource::new(OrderDraft::empty());
        source.update(|draft| draft.items.push(Item::new(1, "Hoodie", Decimal::ONE, Decimal::TEN)));

        let mut reconciled = source.current();
        reconciled.id = 5;
        reconciled.total = Decimal::TEN;

        assert!(source.apply_reconciled(reconciled.clone(), take_remote));
        assert_eq!(source.current(), reconciled);
        assert_eq!(source.revision(), 1);
    }

    #[test]
    fn stale_result_only_adopts_identity() {
        let source = DraftSource::new(OrderDraft::empty());
        source.update(|draft| draft.items.push(Item::new(1, "Hoodie", Decimal::ONE, Decimal::TEN)));
        let mut reconciled = source.current();
        reconciled.id = 5;
        reconciled.items[0].item_id = 50;
        reconciled.total = Decimal::TEN;

        source.update(|draft| draft.items[0].quantity = Decimal::TWO);
        source.apply_reconciled(reconciled, take_remote);

        let current = source.current();
        assert_eq!(current.id, 5);
        assert_eq!(current.items[0].item_id, 50);
        assert_eq!(current.items[0].quantity, Decimal::TWO);
        assert_eq!(current.total, Decimal::ZERO);
        assert_eq!(current.local_revision, 2);
    }
}
