//! Version migrations.
//!
//! Registered edges `(from, to, transform)` form a directed graph over
//! versions. Every edge must move strictly forward, so the graph is acyclic
//! by construction. Path search is breadth-first: the shortest chain wins,
//! and neighbors are visited in ascending target version with registration
//! order breaking ties. When the target is unreachable the chain runs to the
//! closest reachable version and a synthesized default step finishes it.
//!
//! The default step overlays the document onto the default document, so
//! customizations survive and newly introduced default keys appear.

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{merge, ProtectionSet};
use crate::tree::Document;
use crate::version::{document_version, stamp_version, Version};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error type migration transforms may return.
pub type TransformError = Box<dyn std::error::Error + Send + Sync>;

/// A registered transform: `(document, from, to) -> document`.
pub type Transform =
    Arc<dyn Fn(Document, &Version, &Version) -> Result<Document, TransformError> + Send + Sync>;

#[derive(Clone)]
struct MigrationEdge {
    from: Version,
    to: Version,
    transform: Transform,
}

/// One step of a migration chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStep {
    /// A registered transform
    Registered { from: Version, to: Version },
    /// The synthesized merge-with-default step
    Default { from: Version, to: Version },
}

impl MigrationStep {
    pub fn from(&self) -> &Version {
        match self {
            MigrationStep::Registered { from, .. } | MigrationStep::Default { from, .. } => from,
        }
    }

    pub fn to(&self) -> &Version {
        match self {
            MigrationStep::Registered { to, .. } | MigrationStep::Default { to, .. } => to,
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationStep::Registered { from, to } => write!(f, "{} -> {}", from, to),
            MigrationStep::Default { from, to } => write!(f, "{} -> {} (default)", from, to),
        }
    }
}

/// Registry of migration edges.
#[derive(Clone, Default)]
pub struct Migrator {
    edges: Vec<MigrationEdge>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a transform from `from` to `to`.
    ///
    /// Re-registering the same pair replaces the earlier transform but keeps
    /// its position in the tie-breaking order.
    pub fn register<F>(&mut self, from: &str, to: &str, transform: F) -> ConfigResult<()>
    where
        F: Fn(Document, &Version, &Version) -> Result<Document, TransformError> + Send + Sync + 'static,
    {
        let from = Version::parse(from)?;
        let to = Version::parse(to)?;
        if to <= from {
            return Err(ConfigError::MigrationCycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let transform: Transform = Arc::new(transform);
        match self.edges.iter_mut().find(|e| e.from == from && e.to == to) {
            Some(existing) => {
                debug!(%from, %to, "Replacing migration");
                existing.transform = transform;
            }
            None => {
                debug!(%from, %to, "Registered migration");
                self.edges.push(MigrationEdge { from, to, transform });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Finds the chain of steps leading from `from` to `to`. Empty when `from >= to`.
    pub fn find_path(&self, from: &Version, to: &Version) -> Vec<MigrationStep> {
        if from >= to {
            return Vec::new();
        }

        // version -> (predecessor, edge index)
        let mut came_from: HashMap<Version, (Version, usize)> = HashMap::new();
        let mut seen: HashSet<Version> = HashSet::from([from.clone()]);
        let mut queue = VecDeque::from([from.clone()]);
        let mut closest = from.clone();

        while let Some(current) = queue.pop_front() {
            if &current == to {
                break;
            }
            if current > closest {
                closest = current.clone();
            }

            let mut next: Vec<usize> = self
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| e.from == current && &e.to <= to)
                .map(|(i, _)| i)
                .collect();
            next.sort_by(|a, b| self.edges[*a].to.cmp(&self.edges[*b].to).then(a.cmp(b)));

            for index in next {
                let target = self.edges[index].to.clone();
                if seen.insert(target.clone()) {
                    came_from.insert(target.clone(), (current.clone(), index));
                    queue.push_back(target);
                }
            }
        }

        let reached = seen.contains(to);
        let end = if reached { to.clone() } else { closest };

        let mut steps = Vec::new();
        let mut cursor = end.clone();
        while let Some((previous, index)) = came_from.get(&cursor) {
            let edge = &self.edges[*index];
            steps.push(MigrationStep::Registered {
                from: edge.from.clone(),
                to: edge.to.clone(),
            });
            cursor = previous.clone();
        }
        steps.reverse();

        if !reached {
            steps.push(MigrationStep::Default {
                from: end,
                to: to.clone(),
            });
        }
        steps
    }

    /// Brings `doc` up to the version of `default`.
    ///
    /// - no version on `doc`: overlaid onto `default` and stamped
    /// - newer than `default`: [`ConfigError::Downgrade`]
    /// - same version: returned unchanged
    /// - older: the chain from [`find_path`](Self::find_path) is applied,
    ///   stamping each step's target version
    ///
    /// A transform that fails or panics is logged and replaced by the
    /// default step for that edge.
    pub fn upgrade(
        &self,
        doc: Document,
        default: &Document,
        protection: &ProtectionSet,
    ) -> ConfigResult<Document> {
        let Some(target) = document_version(default)? else {
            return Ok(doc);
        };

        let Some(current) = document_version(&doc)? else {
            debug!(version = %target, "Stamping unversioned document");
            let mut upgraded = merge(default, &doc, protection);
            stamp_version(&mut upgraded, &target);
            return Ok(upgraded);
        };

        if current > target {
            return Err(ConfigError::Downgrade {
                found: current.to_string(),
                supported: target.to_string(),
            });
        }
        if current == target {
            return Ok(doc);
        }

        let path = self.find_path(&current, &target);
        info!(from = %current, to = %target, steps = path.len(), "Migrating configuration");

        let mut doc = doc;
        for step in &path {
            doc = self.apply_step(step, doc, default, protection);
        }
        Ok(doc)
    }

    fn apply_step(
        &self,
        step: &MigrationStep,
        doc: Document,
        default: &Document,
        protection: &ProtectionSet,
    ) -> Document {
        let (from, to) = (step.from(), step.to());

        let migrated = match step {
            MigrationStep::Registered { .. } => match self.run_transform(from, to, doc.clone()) {
                Ok(next) => Some(next),
                Err(e) => {
                    warn!(error = %e, "Merging with defaults instead");
                    None
                }
            },
            MigrationStep::Default { .. } => None,
        };

        let mut next = migrated.unwrap_or_else(|| merge(default, &doc, protection));
        stamp_version(&mut next, to);
        next
    }

    /// Runs the registered transform for `from -> to`, catching panics.
    fn run_transform(&self, from: &Version, to: &Version, doc: Document) -> ConfigResult<Document> {
        let failed = |reason: String| ConfigError::Migration {
            from: from.to_string(),
            to: to.to_string(),
            reason,
        };

        let transform = self
            .edges
            .iter()
            .find(|e| &e.from == from && &e.to == to)
            .map(|e| Arc::clone(&e.transform))
            .ok_or_else(|| failed("no transform registered".to_string()))?;

        match panic::catch_unwind(AssertUnwindSafe(|| transform(doc, from, to))) {
            Ok(Ok(next)) => Ok(next),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "transform panicked".to_string());
                Err(failed(format!("panicked: {}", reason)))
            }
        }
    }
}

impl fmt::Debug for Migrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edges: Vec<String> = self
            .edges
            .iter()
            .map(|e| format!("{} -> {}", e.from, e.to))
            .collect();
        f.debug_struct("Migrator").field("edges", &edges).finish()
    }
}
