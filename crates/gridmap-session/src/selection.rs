//! Ordered set of selected connection requests.

use std::collections::HashSet;

use gridmap_core::{ConnectionRequest, ConnectionRequestId};

/// Connection requests the user has staged, unique by id, in selection order.
///
/// Values are kept (not just ids) because requests are selected from
/// paginated lists and map clicks that may no longer be loaded later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    items: Vec<ConnectionRequest>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection, keeping the first occurrence of each id.
    pub fn from_requests(requests: impl IntoIterator<Item = ConnectionRequest>) -> Self {
        let mut selection = Self::new();
        for request in requests {
            selection.insert(request);
        }
        selection
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: &ConnectionRequestId) -> bool {
        self.items.iter().any(|r| &r.id == id)
    }

    pub fn get(&self, id: &ConnectionRequestId) -> Option<&ConnectionRequest> {
        self.items.iter().find(|r| &r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionRequest> {
        self.items.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ConnectionRequestId> {
        self.items.iter().map(|r| &r.id)
    }

    pub fn as_slice(&self) -> &[ConnectionRequest] {
        &self.items
    }

    /// Add a request. Returns `false` if its id is already selected.
    pub fn insert(&mut self, request: ConnectionRequest) -> bool {
        if self.contains(&request.id) {
            return false;
        }
        self.items.push(request);
        true
    }

    pub fn remove(&mut self, id: &ConnectionRequestId) -> Option<ConnectionRequest> {
        let index = self.items.iter().position(|r| &r.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn retain(&mut self, keep: impl FnMut(&ConnectionRequest) -> bool) {
        self.items.retain(keep);
    }
}

impl<'a> IntoIterator for &'a Selection {
    type Item = &'a ConnectionRequest;
    type IntoIter = std::slice::Iter<'a, ConnectionRequest>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Carry a selection over from one scenario to the next.
///
/// Requests of both the previous and the current scenario are dropped, then
/// the current scenario's requests are appended. The result always contains
/// every current scenario request, and applying it twice changes nothing.
pub fn reconcile_selection(
    selection: &Selection,
    previous: &[ConnectionRequest],
    current: &[ConnectionRequest],
) -> Selection {
    let scenario_ids: HashSet<&ConnectionRequestId> =
        previous.iter().chain(current).map(|r| &r.id).collect();

    let kept = selection
        .iter()
        .filter(|r| !scenario_ids.contains(&r.id))
        .cloned();

    Selection::from_requests(kept.chain(current.iter().cloned()))
}
