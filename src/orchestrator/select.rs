//! Deterministic work selection.

use crate::domain::{ItemRef, PrdSet, ProgressLog};

/// Why an item was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// First unchecked item in priority order
    NextOpen,
    /// The previous iteration denied this item
    AddressDenial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub item: ItemRef,
    pub reason: SelectionReason,
}

/// Pick the next item, or `None` when every item is done.
///
/// A pending denial always wins: if the newest progress entry is a denial
/// of an item that is still open, that item is selected again. Otherwise
/// the first open item by (PRD priority, item index) is chosen. The result
/// depends only on the two inputs.
pub fn select_next(prds: &PrdSet, log: &ProgressLog) -> Option<Selection> {
    if let Some(denied) = log.pending_denial() {
        match prds.item(&denied.item) {
            Some((_, item)) if !item.done => {
                return Some(Selection {
                    item: denied.item.clone(),
                    reason: SelectionReason::AddressDenial,
                });
            }
            Some(_) => log::debug!("Denied {} has since been checked", denied.item),
            None => log::warn!("Denied {} no longer exists in the PRD set", denied.item),
        }
    }

    prds.first_open().map(|item| Selection {
        item,
        reason: SelectionReason::NextOpen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Prd, PrdRef, ProgressEntry, VerdictKind};

    fn prds() -> PrdSet {
        PrdSet::new(vec![
            Prd::parse("02-b.md", "- [ ] b1\n- [ ] b2\n- [ ] b3\n").unwrap(),
            Prd::parse("01-a.md", "- [ ] a1\n- [ ] a2\n").unwrap(),
        ])
    }

    fn item(prd: &str, index: usize) -> ItemRef {
        ItemRef::new(PrdRef::new(prd), index)
    }

    #[test]
    fn test_priority_order_with_all_approved() {
        let mut set = prds();
        let log = ProgressLog::new();
        let mut order = Vec::new();
        while let Some(sel) = select_next(&set, &log) {
            order.push(sel.item.to_string());
            set.mark_done(&sel.item).unwrap();
        }
        assert_eq!(
            order,
            vec![
                "01-a.md item 1",
                "01-a.md item 2",
                "02-b.md item 1",
                "02-b.md item 2",
                "02-b.md item 3"
            ]
        );
    }

    #[test]
    fn test_selection_is_idempotent() {
        let set = prds();
        let log = ProgressLog::new();
        let first = select_next(&set, &log);
        for _ in 0..5 {
            assert_eq!(select_next(&set, &log), first);
        }
    }

    #[test]
    fn test_denial_takes_precedence_over_priority() {
        let set = prds();
        let mut log = ProgressLog::new();
        log.append(ProgressEntry::new(1, item("02-b.md", 1), "b2", VerdictKind::Denied, "no"))
            .unwrap();

        let sel = select_next(&set, &log).unwrap();
        assert_eq!(sel.item, item("02-b.md", 1));
        assert_eq!(sel.reason, SelectionReason::AddressDenial);
    }

    #[test]
    fn test_approval_clears_precedence() {
        let set = prds();
        let mut log = ProgressLog::new();
        log.append(ProgressEntry::new(1, item("02-b.md", 1), "b2", VerdictKind::Denied, "no"))
            .unwrap();
        log.append(ProgressEntry::new(2, item("02-b.md", 1), "b2", VerdictKind::Approved, "ok"))
            .unwrap();

        let sel = select_next(&set, &log).unwrap();
        assert_eq!(sel.item, item("01-a.md", 0));
        assert_eq!(sel.reason, SelectionReason::NextOpen);
    }

    #[test]
    fn test_stale_denial_falls_back() {
        let mut set = prds();
        set.mark_done(&item("01-a.md", 0)).unwrap();
        let mut log = ProgressLog::new();
        log.append(ProgressEntry::new(1, item("01-a.md", 0), "a1", VerdictKind::Denied, "no"))
            .unwrap();
        log.append(ProgressEntry::new(2, item("01-a.md", 9), "gone", VerdictKind::Denied, "no"))
            .unwrap();

        assert_eq!(select_next(&set, &log).unwrap().item, item("01-a.md", 1));
    }

    #[test]
    fn test_none_when_all_done() {
        let set = PrdSet::new(vec![Prd::parse("01-a.md", "- [x] a1\n").unwrap()]);
        assert_eq!(select_next(&set, &ProgressLog::new()), None);
    }
}
