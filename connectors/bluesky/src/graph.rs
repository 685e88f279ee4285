//! Caller-owned graph session: fetched records, the filtered view and the
//! selection handed to the action queue.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    crawler::RecordFilter,
    queue::{ActionTask, MutationKind},
    types::{AccountRecord, Did, Direction, EdgeRef},
};

/// What to fetch, as offered to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Followers,
    FollowersNonMutuals,
    Following,
    FollowingNonMutuals,
    /// Accounts the session identity follows that do not follow back.
    MyNonMutuals,
}

impl Source {
    pub const ALL: [Self; 5] = [
        Self::Followers,
        Self::FollowersNonMutuals,
        Self::Following,
        Self::FollowingNonMutuals,
        Self::MyNonMutuals,
    ];

    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Followers | Self::FollowersNonMutuals => Direction::Followers,
            Self::Following | Self::FollowingNonMutuals | Self::MyNonMutuals => {
                Direction::Following
            }
        }
    }

    #[must_use]
    pub fn filter(self) -> Option<RecordFilter> {
        match self {
            Self::Followers | Self::Following => None,
            Self::FollowersNonMutuals | Self::FollowingNonMutuals | Self::MyNonMutuals => {
                Some(RecordFilter::non_mutual())
            }
        }
    }

    /// Whether the crawl target is the session identity itself.
    #[must_use]
    pub const fn targets_self(self) -> bool {
        matches!(self, Self::MyNonMutuals)
    }

    /// Mutation normally applied to this source's results.
    #[must_use]
    pub const fn default_kind(self) -> MutationKind {
        match self {
            Self::MyNonMutuals => MutationKind::Unfollow,
            _ => MutationKind::Follow,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::FollowersNonMutuals => "followers_non_mutuals",
            Self::Following => "following",
            Self::FollowingNonMutuals => "following_non_mutuals",
            Self::MyNonMutuals => "my_non_mutuals",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == normalized)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown source '{s}', expected one of: {}", names.join(", "))
            })
    }
}

/// Search and visibility options over the fetched records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    /// Case-insensitive substring matched against display name and handle
    pub query: String,
    /// Hide accounts the session identity already follows
    pub hide_following: bool,
}

impl ViewFilter {
    #[must_use]
    pub fn matches(&self, record: &AccountRecord) -> bool {
        if self.hide_following && record.is_followed() {
            return false;
        }
        let query = self.query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        record
            .display_name
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&query))
            || record.handle.to_lowercase().contains(&query)
    }
}

/// Records fetched during this session plus the operator's view and selection.
///
/// Records are keyed by did and kept in fetch order. The selection only ever
/// holds dids of visible records and keeps selection order.
#[derive(Debug, Default)]
pub struct GraphSession {
    records: Vec<AccountRecord>,
    index: HashMap<Did, usize>,
    view: ViewFilter,
    visible: Vec<usize>,
    selected: Vec<Did>,
    selected_set: HashSet<Did>,
}

impl GraphSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_records(records: Vec<AccountRecord>) -> Self {
        let mut session = Self::new();
        session.replace_records(records);
        session
    }

    /// Replace the records with a fresh fetch. Clears the selection.
    pub fn replace_records(&mut self, records: Vec<AccountRecord>) {
        self.records.clear();
        self.index.clear();
        for record in records {
            if self.index.contains_key(&record.did) {
                continue;
            }
            self.index.insert(record.did.clone(), self.records.len());
            self.records.push(record);
        }
        self.selected.clear();
        self.selected_set.clear();
        self.apply_view();
    }

    #[must_use]
    pub fn records(&self) -> &[AccountRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn record(&self, did: &Did) -> Option<&AccountRecord> {
        self.index.get(did).map(|&i| &self.records[i])
    }

    /// Mutable access to a record. Call [`GraphSession::apply_view`] after
    /// changing anything the view filters on.
    pub fn record_mut(&mut self, did: &Did) -> Option<&mut AccountRecord> {
        self.index.get(did).map(|&i| &mut self.records[i])
    }

    /// Record the acting identity's follow edge to `did` and refresh the view.
    ///
    /// Returns `false` when the session does not hold `did`.
    pub fn set_following(&mut self, did: &Did, edge: Option<EdgeRef>) -> bool {
        let Some(record) = self.record_mut(did) else {
            return false;
        };
        record.viewer.following = edge;
        self.apply_view();
        true
    }

    #[must_use]
    pub const fn view(&self) -> &ViewFilter {
        &self.view
    }

    /// Change the view and drop selected dids that are no longer visible.
    pub fn set_view(&mut self, view: ViewFilter) {
        self.view = view;
        self.apply_view();
    }

    /// Recompute visibility, e.g. after follow state changed during a run.
    pub fn apply_view(&mut self) {
        self.visible = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.view.matches(r))
            .map(|(i, _)| i)
            .collect();

        let visible: HashSet<&Did> = self.visible.iter().map(|&i| &self.records[i].did).collect();
        self.selected.retain(|did| visible.contains(did));
        self.selected_set.retain(|did| visible.contains(did));
    }

    pub fn visible(&self) -> impl Iterator<Item = &AccountRecord> {
        self.visible.iter().map(|&i| &self.records[i])
    }

    #[must_use]
    pub fn visible_len(&self) -> usize {
        self.visible.len()
    }

    fn is_visible(&self, did: &Did) -> bool {
        self.index
            .get(did)
            .is_some_and(|i| self.visible.binary_search(i).is_ok())
    }

    #[must_use]
    pub fn is_selected(&self, did: &Did) -> bool {
        self.selected_set.contains(did)
    }

    /// Add a visible record to the selection. Returns whether it was added.
    pub fn select(&mut self, did: &Did) -> bool {
        if self.selected_set.contains(did) || !self.is_visible(did) {
            return false;
        }
        self.selected_set.insert(did.clone());
        self.selected.push(did.clone());
        true
    }

    pub fn deselect(&mut self, did: &Did) -> bool {
        if !self.selected_set.remove(did) {
            return false;
        }
        self.selected.retain(|d| d != did);
        true
    }

    /// Flip selection of `did`. Returns the new selection state.
    pub fn toggle(&mut self, did: &Did) -> bool {
        if self.deselect(did) {
            false
        } else {
            self.select(did)
        }
    }

    /// Select every visible record. Returns the selection size.
    pub fn select_all_visible(&mut self) -> usize {
        let dids: Vec<Did> = self.visible().map(|r| r.did.clone()).collect();
        for did in &dids {
            self.select(did);
        }
        self.selected.len()
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.selected_set.clear();
    }

    #[must_use]
    pub fn selected(&self) -> &[Did] {
        &self.selected
    }

    /// Queue tasks for the current selection, in selection order.
    #[must_use]
    pub fn tasks_for(&self, kind: MutationKind) -> Vec<ActionTask> {
        self.selected
            .iter()
            .map(|did| ActionTask {
                did: did.clone(),
                kind,
                snapshot: self.record(did).cloned(),
            })
            .collect()
    }
}
