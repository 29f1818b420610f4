//! Knowledge store: learned fix patterns with a durable projection
//!
//! Single writer (the fix engine and the peer-event router), cheap
//! snapshot readers. The on-disk form under
//! `knowledge-base/health-check-fixes/known-fixes.json` is the single
//! source of truth across restarts; while the process runs the
//! in-memory map is authoritative and sink write failures only log.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_common::{Error, FixActionKind, FixPattern, PatternMetadata, Result};

/// Patterns kept in memory before the oldest are evicted
const MAX_PATTERNS: usize = 128;

const FIXES_SUBDIR: &str = "health-check-fixes";
const FIXES_FILE: &str = "known-fixes.json";
const PIECES_SUBDIR: &str = "pieces-integration";

/// One snapshot published to the external knowledge sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiecesEntry {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub metadata: PatternMetadata,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Bounded key→pattern map with incremental success-rate learning
pub struct KnowledgeStore {
    patterns: RwLock<HashMap<String, FixPattern>>,
    fixes_path: PathBuf,
    pieces_dir: Option<PathBuf>,
}

impl KnowledgeStore {
    /// Open the store under the knowledge-base directory, loading any
    /// existing patterns from disk.
    pub fn open(knowledge_base_dir: &Path, pieces_enabled: bool) -> Result<Self> {
        let fixes_dir = knowledge_base_dir.join(FIXES_SUBDIR);
        std::fs::create_dir_all(&fixes_dir)?;
        let fixes_path = fixes_dir.join(FIXES_FILE);

        let pieces_dir = if pieces_enabled {
            let dir = knowledge_base_dir.join(PIECES_SUBDIR);
            std::fs::create_dir_all(&dir)?;
            Some(dir)
        } else {
            None
        };

        let patterns = if fixes_path.exists() {
            let raw = std::fs::read_to_string(&fixes_path)?;
            let loaded: Vec<FixPattern> = serde_json::from_str(&raw)?;
            info!("loaded {} known fixes from {}", loaded.len(), fixes_path.display());
            loaded.into_iter().map(|p| (p.key.clone(), p)).collect()
        } else {
            HashMap::new()
        };

        Ok(KnowledgeStore {
            patterns: RwLock::new(patterns),
            fixes_path,
            pieces_dir,
        })
    }

    /// In-memory store with no durable projection, for callers that
    /// only need the learning behaviour.
    pub fn ephemeral() -> Self {
        KnowledgeStore {
            patterns: RwLock::new(HashMap::new()),
            fixes_path: PathBuf::new(),
            pieces_dir: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<FixPattern> {
        self.patterns.read().get(key).cloned()
    }

    /// Consistent copy of the whole map, taken at session start.
    pub fn snapshot(&self) -> HashMap<String, FixPattern> {
        self.patterns.read().clone()
    }

    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.read().is_empty()
    }

    /// Fold an observed fix outcome into the store and publish the
    /// updated pattern. Returns the pattern as stored.
    pub fn record(
        &self,
        key: &str,
        action: FixActionKind,
        success: bool,
        metadata: PatternMetadata,
    ) -> FixPattern {
        let pattern = {
            let mut patterns = self.patterns.write();
            let pattern = match patterns.get_mut(key) {
                Some(existing) => {
                    existing.record_outcome(success);
                    existing.action = action;
                    existing.clone()
                }
                None => {
                    let fresh = FixPattern::first_application(key, action, success, metadata);
                    patterns.insert(key.to_string(), fresh.clone());
                    fresh
                }
            };
            Self::evict_overflow(&mut patterns);
            pattern
        };

        if let Err(e) = self.persist() {
            warn!("knowledge store persist failed: {}", e);
        }
        if let Err(e) = self.publish_pieces_entry(&pattern) {
            warn!("knowledge sink write failed: {}", e);
        }
        pattern
    }

    fn evict_overflow(patterns: &mut HashMap<String, FixPattern>) {
        while patterns.len() > MAX_PATTERNS {
            let oldest = patterns
                .values()
                .min_by_key(|p| p.last_applied_at)
                .map(|p| p.key.clone());
            match oldest {
                Some(key) => {
                    debug!("evicting oldest fix pattern '{}'", key);
                    patterns.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Write the full pattern set to its on-disk form. Temp-and-rename
    /// keeps readers from ever seeing a torn file.
    fn persist(&self) -> Result<()> {
        if self.fixes_path.as_os_str().is_empty() {
            return Ok(());
        }
        let mut patterns: Vec<FixPattern> = self.patterns.read().values().cloned().collect();
        patterns.sort_by(|a, b| a.key.cmp(&b.key));
        let raw = serde_json::to_string_pretty(&patterns)?;

        let tmp = self.fixes_path.with_extension("json.tmp");
        std::fs::write(&tmp, raw).map_err(|e| Error::SinkWrite(e.to_string()))?;
        std::fs::rename(&tmp, &self.fixes_path).map_err(|e| Error::SinkWrite(e.to_string()))?;
        Ok(())
    }

    fn publish_pieces_entry(&self, pattern: &FixPattern) -> Result<()> {
        let Some(pieces_dir) = &self.pieces_dir else {
            return Ok(());
        };
        let entry = PiecesEntry {
            id: Uuid::new_v4(),
            title: format!("Fix pattern: {}", pattern.key),
            description: format!(
                "{} remediated by {} ({} applications, {:.0}% success)",
                pattern.key,
                pattern.action.as_str(),
                pattern.applied_count,
                pattern.success_rate * 100.0
            ),
            tags: pattern.tags.clone(),
            metadata: pattern.metadata.clone(),
            content: serde_json::to_string_pretty(pattern)?,
            timestamp: Utc::now(),
        };
        let path = pieces_dir.join(format!("fix-{}.json", Utc::now().timestamp_millis()));
        std::fs::write(&path, serde_json::to_string_pretty(&entry)?)
            .map_err(|e| Error::SinkWrite(e.to_string()))?;
        debug!("published knowledge entry {}", path.display());
        Ok(())
    }
}
