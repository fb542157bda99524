// src/crawl/visited.rs
// =============================================================================
// The visited store: which addresses the crawl has already seen.
//
// Every address goes through three steps:
//   claim  -> exactly one worker wins the right to fetch it
//   store  -> the finished Page is kept (or `abandon` on a network error)
//   resolve / snapshot -> read back when building the result graph
//
// The claim is one atomic insert on the map entry. "Check if visited, fetch,
// then insert" is not enough: two workers can both see "not visited" while
// the fetch is still in progress and fetch the same page twice.
// =============================================================================

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Admission;
use crate::graph::{Page, PageStatus};

#[derive(Debug)]
enum Slot {
    Claimed,
    Visited(Page),
    Abandoned,
}

/// Result of trying to claim an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The caller owns this address and must fetch it.
    Claimed,
    /// Someone else already claimed it.
    Known,
    /// The page limit is reached; nobody will fetch it.
    Rejected,
}

/// What the store knows about an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Visited(PageStatus),
    InFlight,
    Abandoned,
    NotFound,
}

#[derive(Debug)]
pub struct VisitedStore {
    slots: DashMap<String, Slot>,
    admitted: AtomicUsize,
    limit: Option<usize>,
}

impl VisitedStore {
    pub fn new(admission: Admission) -> Self {
        Self {
            slots: DashMap::new(),
            admitted: AtomicUsize::new(0),
            limit: admission.limit(),
        }
    }

    /// Atomically reserves `address` for one fetch.
    pub fn claim(&self, address: &str) -> Claim {
        // Most links point somewhere we've been; skip the allocation for those
        if self.slots.contains_key(address) {
            return Claim::Known;
        }

        match self.slots.entry(address.to_string()) {
            Entry::Occupied(_) => Claim::Known,
            Entry::Vacant(slot) => {
                let admitted = self.admitted.fetch_add(1, Ordering::SeqCst);
                if self.limit.is_some_and(|limit| admitted >= limit) {
                    self.admitted.fetch_sub(1, Ordering::SeqCst);
                    return Claim::Rejected;
                }
                slot.insert(Slot::Claimed);
                Claim::Claimed
            }
        }
    }

    /// Keeps a finished page. The first page stored for an address wins.
    pub fn store(&self, page: Page) {
        match self.slots.entry(page.address.clone()) {
            Entry::Occupied(mut slot) => {
                if let Slot::Visited(existing) = slot.get() {
                    log::debug!("Discarding second page for {}", existing.address);
                } else {
                    slot.insert(Slot::Visited(page));
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Visited(page));
            }
        }
    }

    /// Gives up on an address. It stays known, so it is never retried.
    pub fn abandon(&self, address: &str) {
        match self.slots.entry(address.to_string()) {
            Entry::Occupied(mut slot) => {
                if matches!(slot.get(), Slot::Claimed) {
                    slot.insert(Slot::Abandoned);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Abandoned);
            }
        }
    }

    pub fn resolve(&self, address: &str) -> Lookup {
        match self.slots.get(address).as_deref() {
            Some(Slot::Visited(page)) => Lookup::Visited(page.status),
            Some(Slot::Claimed) => Lookup::InFlight,
            Some(Slot::Abandoned) => Lookup::Abandoned,
            None => Lookup::NotFound,
        }
    }

    /// Number of addresses that have a page.
    pub fn visited(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Visited(_)))
            .count()
    }

    /// Copies out every stored page, keyed by address.
    pub fn snapshot(&self) -> BTreeMap<String, Page> {
        self.slots
            .iter()
            .filter_map(|entry| match entry.value() {
                Slot::Visited(page) => Some((entry.key().clone(), page.clone())),
                _ => None,
            })
            .collect()
    }
}
