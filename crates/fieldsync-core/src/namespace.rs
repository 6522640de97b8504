//! Per-account namespacing of storage keys and database names.
//!
//! Every component derives its keys through [`Namespace`] so that switching
//! accounts never leaks one account's queue, catalog, or manifest into
//! another's. A missing identity resolves to the `"anon"` sentinel.

use crate::defaults;

/// Sentinel account id used when no identity capability is available.
pub const ANON_ACCOUNT: &str = "anon";

/// Resolved per-account namespace.
///
/// Cheap to construct; re-resolve on every access rather than caching, so an
/// account switch is picked up the next time a component derives a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    account_id: String,
}

impl Namespace {
    /// Resolve the namespace for the given account id.
    ///
    /// `None`, empty, or whitespace-only ids resolve to [`ANON_ACCOUNT`].
    pub fn resolve(account_id: Option<&str>) -> Self {
        let id = account_id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(ANON_ACCOUNT);
        Self {
            account_id: id.to_string(),
        }
    }

    /// The resolved account id (possibly the anonymous sentinel).
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Whether this namespace belongs to the anonymous sentinel account.
    pub fn is_anonymous(&self) -> bool {
        self.account_id == ANON_ACCOUNT
    }

    /// Account-scoped storage key: `"{base}::{account}"`.
    pub fn scoped_key(&self, base: &str) -> String {
        format!("{}::{}", base, self.account_id)
    }

    /// Per-account database file name.
    ///
    /// The anonymous account keeps the bare base name so pre-namespacing
    /// installations continue to open their existing database.
    pub fn database_name(&self, base: &str) -> String {
        if self.is_anonymous() {
            format!("{base}.db")
        } else {
            format!("{}__{}.db", base, self.account_id)
        }
    }

    /// Name of this account's remote manifest document.
    pub fn manifest_name(&self) -> String {
        format!("{}__{}.json", defaults::MANIFEST_BASENAME, self.account_id)
    }

    /// Name of a per-module remote history document (legacy variant, no
    /// revision marker; merged record-by-record).
    pub fn module_history_name(&self, module: &str) -> String {
        format!("{module}-history.json")
    }
}
