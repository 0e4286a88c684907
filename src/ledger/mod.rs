//! Append-only ledger of known-incomplete items.
//!
//! The ledger is the pipeline's single admission of what is still broken.
//! Items enter only through [`IncompletenessLedger::append`] and leave the
//! open set only through [`IncompletenessLedger::resolve`], which demands
//! evidence. Nothing is ever deleted and `Resolved` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::LedgerError;
use crate::store::{self, KNOWN_INCOMPLETE_KEY, PersistenceBackend};

/// Lifecycle state of a known-incomplete item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    Disabled,
    Buggy,
    Unverified,
    Partial,
    Resolved,
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Disabled => write!(f, "DISABLED"),
            ItemState::Buggy => write!(f, "BUGGY"),
            ItemState::Unverified => write!(f, "UNVERIFIED"),
            ItemState::Partial => write!(f, "PARTIAL"),
            ItemState::Resolved => write!(f, "RESOLVED"),
        }
    }
}

impl std::str::FromStr for ItemState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DISABLED" => Ok(ItemState::Disabled),
            "BUGGY" => Ok(ItemState::Buggy),
            "UNVERIFIED" => Ok(ItemState::Unverified),
            "PARTIAL" => Ok(ItemState::Partial),
            "RESOLVED" => Ok(ItemState::Resolved),
            _ => anyhow::bail!(
                "Invalid item state '{}'. Valid values: disabled, buggy, unverified, partial, resolved",
                s
            ),
        }
    }
}

/// A disclosed defect or gap.
///
/// `resolved_at` and `resolution_evidence` are set exactly when `state` is
/// `Resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownIncompleteItem {
    pub id: String,
    pub item: String,
    pub state: ItemState,
    pub impact: String,
    pub phase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_function: Option<String>,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_evidence: Option<String>,
}

impl KnownIncompleteItem {
    pub fn is_resolved(&self) -> bool {
        self.state == ItemState::Resolved
    }

    /// Whether the resolution fields agree with the state.
    pub fn is_well_formed(&self) -> bool {
        let has_evidence = self
            .resolution_evidence
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        if self.is_resolved() {
            self.resolved_at.is_some() && has_evidence
        } else {
            self.resolved_at.is_none() && self.resolution_evidence.is_none()
        }
    }
}

/// An item as submitted to [`IncompletenessLedger::append`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIncompleteItem {
    pub item: String,
    pub state: ItemState,
    pub impact: String,
    pub phase: String,
    #[serde(default)]
    pub affected_function: Option<String>,
}

/// Per-state item counts over the whole history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub disabled: usize,
    pub buggy: usize,
    pub unverified: usize,
    pub partial: usize,
    pub resolved: usize,
}

impl LedgerSummary {
    pub fn total(&self) -> usize {
        self.open() + self.resolved
    }

    /// Items not yet resolved.
    pub fn open(&self) -> usize {
        self.disabled + self.buggy + self.unverified + self.partial
    }
}

pub struct IncompletenessLedger {
    backend: Arc<dyn PersistenceBackend>,
    items: Vec<KnownIncompleteItem>,
}

impl IncompletenessLedger {
    /// Open the ledger, loading any persisted items.
    ///
    /// Unreadable or corrupt storage yields an empty ledger. Persisted items
    /// whose resolution fields contradict their state are kept verbatim and
    /// reported by [`IncompletenessLedger::malformed_ids`].
    pub fn open(backend: Arc<dyn PersistenceBackend>) -> Self {
        let items: Vec<KnownIncompleteItem> =
            store::load_or_default(backend.as_ref(), KNOWN_INCOMPLETE_KEY);
        for item in items.iter().filter(|i| !i.is_well_formed()) {
            tracing::warn!(item_id = %item.id, state = %item.state, "malformed ledger entry kept as loaded");
        }
        tracing::debug!(count = items.len(), "ledger loaded");
        Self { backend, items }
    }

    /// Record a new known-incomplete item.
    pub fn append(&mut self, new: NewIncompleteItem) -> KnownIncompleteItem {
        // An item cannot be born resolved: it would carry no evidence.
        let state = if new.state == ItemState::Resolved {
            tracing::warn!(item = %new.item, "appending item as UNVERIFIED; use resolve() to close it");
            ItemState::Unverified
        } else {
            new.state
        };

        let item = KnownIncompleteItem {
            id: format!("KI-{}", Uuid::new_v4()),
            item: new.item,
            state,
            impact: new.impact,
            phase: new.phase,
            affected_function: new.affected_function,
            added_at: Utc::now(),
            resolved_at: None,
            resolution_evidence: None,
        };
        self.items.push(item.clone());
        tracing::info!(item_id = %item.id, state = %item.state, phase = %item.phase, "known-incomplete item recorded");
        self.persist();
        item
    }

    /// Mark the item `id` as resolved, with mandatory evidence.
    ///
    /// Blank evidence is rejected before anything is touched. An unknown id or
    /// an already resolved item is a silent no-op.
    pub fn resolve(&mut self, id: &str, evidence: &str) -> Result<(), LedgerError> {
        if evidence.trim().is_empty() {
            return Err(LedgerError::EmptyEvidence { id: id.to_string() });
        }

        let Some(item) = self.items.iter_mut().find(|i| i.id == id) else {
            tracing::debug!(item_id = id, "resolve: no such item");
            return Ok(());
        };
        if item.is_resolved() {
            tracing::debug!(item_id = id, "resolve: item already resolved");
            return Ok(());
        }

        item.state = ItemState::Resolved;
        item.resolved_at = Some(Utc::now());
        item.resolution_evidence = Some(evidence.to_string());
        tracing::info!(item_id = id, "known-incomplete item resolved");
        self.persist();
        Ok(())
    }

    /// Full history in insertion order, resolved items included.
    pub fn get_all(&self) -> Vec<KnownIncompleteItem> {
        self.items.clone()
    }

    pub fn get_unresolved(&self) -> Vec<KnownIncompleteItem> {
        self.items
            .iter()
            .filter(|i| !i.is_resolved())
            .cloned()
            .collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_resolved()).count()
    }

    /// `false` exactly when the verifier failed but nothing is disclosed as open.
    pub fn validate_consistency(&self, exit_code: i32) -> bool {
        !(exit_code != 0 && self.unresolved_count() == 0)
    }

    /// Ids of items whose resolution fields contradict their state.
    pub fn malformed_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|i| !i.is_well_formed())
            .map(|i| i.id.clone())
            .collect()
    }

    pub fn get_summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary::default();
        for item in &self.items {
            match item.state {
                ItemState::Disabled => summary.disabled += 1,
                ItemState::Buggy => summary.buggy += 1,
                ItemState::Unverified => summary.unverified += 1,
                ItemState::Partial => summary.partial += 1,
                ItemState::Resolved => summary.resolved += 1,
            }
        }
        summary
    }

    // Best-effort: the in-memory collection stays authoritative if this fails.
    fn persist(&self) {
        store::save_best_effort(self.backend.as_ref(), KNOWN_INCOMPLETE_KEY, &self.items);
    }
}
