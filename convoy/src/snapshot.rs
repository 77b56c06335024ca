// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! In-memory snapshot store backing the control-plane server.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::RwLock;

/// One versioned set of resources for a node. Resource contents are opaque
/// to the store; only the name and version are inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    #[serde(default)]
    pub clusters: Vec<Value>,
    #[serde(default)]
    pub listeners: Vec<Value>,
    #[serde(default)]
    pub routes: Vec<Value>,
    #[serde(default)]
    pub endpoints: Vec<Value>,
}

impl Snapshot {
    /// Checks the snapshot is usable: a version is present and every
    /// resource carries a non-empty name.
    pub fn consistent(&self) -> Result<(), String> {
        if self.version.is_empty() {
            return Err("snapshot version must not be empty".into());
        }
        for section in [&self.clusters, &self.listeners, &self.routes, &self.endpoints] {
            for resource in section {
                if resource
                    .get("name")
                    .and_then(Value::as_str)
                    .is_none_or(str::is_empty)
                {
                    return Err("every resource needs a non-empty name".into());
                }
            }
        }
        Ok(())
    }

    /// Starter snapshot: one listener routed to one cluster.
    pub fn example() -> Self {
        Snapshot {
            version: "1".into(),
            clusters: vec![json!({
                "name": "example-cluster",
                "connect_timeout": "5s",
                "endpoints": [{"address": "127.0.0.1", "port": 8080}],
            })],
            listeners: vec![json!({
                "name": "example-listener",
                "address": "0.0.0.0",
                "port": 10000,
                "route": "example-route",
            })],
            routes: vec![json!({
                "name": "example-route",
                "cluster": "example-cluster",
            })],
            endpoints: vec![],
        }
    }
}

/// Thread-safe, node-id keyed snapshot store.
#[derive(Default)]
pub struct SnapshotCache {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the node's snapshot after a consistency check.
    pub fn set(&self, node: &str, snapshot: Snapshot) -> Result<(), String> {
        snapshot.consistent()?;
        self.snapshots
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.to_string(), snapshot);
        Ok(())
    }

    pub fn get(&self, node: &str) -> Option<Snapshot> {
        self.snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(node)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshots
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_is_consistent() {
        Snapshot::example().consistent().unwrap();
    }

    #[test]
    fn test_consistent_rejects_empty_version() {
        let snapshot = Snapshot {
            version: String::new(),
            clusters: vec![],
            listeners: vec![],
            routes: vec![],
            endpoints: vec![],
        };
        assert!(snapshot.consistent().is_err());
    }

    #[test]
    fn test_consistent_rejects_nameless_resource() {
        let mut snapshot = Snapshot::example();
        snapshot.clusters.push(json!({"connect_timeout": "1s"}));
        assert!(snapshot.consistent().is_err());
    }

    #[test]
    fn test_set_and_get() {
        let cache = SnapshotCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("node-a").is_none());

        cache.set("node-a", Snapshot::example()).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("node-a").unwrap().version, "1");
    }

    #[test]
    fn test_set_replaces() {
        let cache = SnapshotCache::new();
        cache.set("node-a", Snapshot::example()).unwrap();

        let mut next = Snapshot::example();
        next.version = "2".into();
        cache.set("node-a", next).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("node-a").unwrap().version, "2");
    }

    #[test]
    fn test_set_rejects_inconsistent() {
        let cache = SnapshotCache::new();
        let mut snapshot = Snapshot::example();
        snapshot.version = String::new();
        assert!(cache.set("node-a", snapshot).is_err());
        assert!(cache.is_empty());
    }
}
