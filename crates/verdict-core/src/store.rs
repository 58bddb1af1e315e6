//! Compiled policy store
//!
//! Holds compiled policies keyed by document id behind an atomically swapped
//! immutable snapshot: readers clone an `Arc` and never block, updates
//! publish a new snapshot with a bumped version. Loading a directory
//! compiles every `*.json` policy document found in it.

use crate::compiler::{compile, CompiledPolicy};
use crate::document::PolicyDocument;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Immutable snapshot of all compiled policies
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Version number (monotonically increasing)
    pub version: u64,
    policies: HashMap<String, Arc<CompiledPolicy>>,
}

impl StoreSnapshot {
    /// Create an empty snapshot
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a policy by id
    pub fn get(&self, id: &str) -> Option<&Arc<CompiledPolicy>> {
        self.policies.get(id)
    }

    /// All policy ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.policies.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the snapshot holds no policies
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Policy store with lock-free reads
#[derive(Debug, Default)]
pub struct PolicyStore {
    snapshot: ArcSwap<StoreSnapshot>,
}

impl PolicyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(StoreSnapshot::empty()),
        }
    }

    /// Load and compile every `*.json` policy document under `dir`
    pub fn load_dir(dir: impl AsRef<Path>) -> crate::Result<Self> {
        let store = Self::new();
        let mut entries: Vec<_> = fs::read_dir(dir.as_ref())?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        for path in entries {
            let text = fs::read_to_string(&path)?;
            let doc = PolicyDocument::from_json_str(&text)
                .map_err(crate::compiler::SpecError::Document)?;
            store.insert(&doc)?;
            debug!(path = %path.display(), "loaded policy document");
        }

        Ok(store)
    }

    /// Compile a document and publish a new snapshot containing it.
    /// An existing policy with the same id is replaced.
    pub fn insert(&self, doc: &PolicyDocument) -> crate::Result<Arc<CompiledPolicy>> {
        let compiled = Arc::new(compile(doc)?);

        let inserted = Arc::clone(&compiled);
        self.snapshot.rcu(move |current| {
            let mut policies = current.policies.clone();
            if policies
                .insert(inserted.id().to_string(), Arc::clone(&inserted))
                .is_some()
            {
                warn!(id = inserted.id(), "replacing existing policy");
            }
            StoreSnapshot { version: current.version + 1, policies }
        });

        Ok(compiled)
    }

    /// Get a policy by id
    pub fn get(&self, id: &str) -> Option<Arc<CompiledPolicy>> {
        self.snapshot.load().get(id).cloned()
    }

    /// Get a policy by id, erroring when absent
    pub fn require(&self, id: &str) -> crate::Result<Arc<CompiledPolicy>> {
        self.get(id).ok_or_else(|| crate::Error::PolicyNotFound(id.to_string()))
    }

    /// Current immutable snapshot
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshot.load_full()
    }
}
