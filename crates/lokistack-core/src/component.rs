//! Loki components managed by the operator

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Loki microservice target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    Distributor,
    Ingester,
    Querier,
    QueryFrontend,
    Compactor,
    IndexGateway,
    Ruler,
}

/// How a component's pods are managed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl Component {
    /// Components in synthesis order
    pub const ALL: [Component; 7] = [
        Component::Distributor,
        Component::Ingester,
        Component::Querier,
        Component::QueryFrontend,
        Component::Compactor,
        Component::IndexGateway,
        Component::Ruler,
    ];

    /// Name used for labels, resource names and the `-target` flag
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Distributor => "distributor",
            Component::Ingester => "ingester",
            Component::Querier => "querier",
            Component::QueryFrontend => "query-frontend",
            Component::Compactor => "compactor",
            Component::IndexGateway => "index-gateway",
            Component::Ruler => "ruler",
        }
    }

    /// Components holding local state or taking part in the ring run as StatefulSets
    pub fn workload_kind(&self) -> WorkloadKind {
        match self {
            Component::Ingester
            | Component::Compactor
            | Component::IndexGateway
            | Component::Ruler => WorkloadKind::StatefulSet,
            Component::Distributor | Component::Querier | Component::QueryFrontend => {
                WorkloadKind::Deployment
            }
        }
    }

    /// Members of the memberlist gossip ring
    pub fn is_ring_member(&self) -> bool {
        !matches!(self, Component::QueryFrontend | Component::Compactor)
    }

    /// Singletons get no disruption budget
    pub fn has_disruption_budget(&self) -> bool {
        !matches!(self, Component::Compactor)
    }

    /// Components with a write-ahead log volume in addition to storage
    pub fn has_wal(&self) -> bool {
        matches!(self, Component::Ingester | Component::Ruler)
    }

    /// Components that read or write object storage
    pub fn uses_object_storage(&self) -> bool {
        !matches!(self, Component::Distributor | Component::QueryFrontend)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workload_kinds() {
        assert_eq!(Component::Distributor.workload_kind(), WorkloadKind::Deployment);
        assert_eq!(Component::QueryFrontend.workload_kind(), WorkloadKind::Deployment);
        assert_eq!(Component::Ingester.workload_kind(), WorkloadKind::StatefulSet);
        assert_eq!(Component::Compactor.workload_kind(), WorkloadKind::StatefulSet);
    }

    #[test]
    fn test_ring_membership() {
        let members: Vec<_> = Component::ALL
            .iter()
            .filter(|c| c.is_ring_member())
            .map(|c| c.as_str())
            .collect();
        assert_eq!(
            members,
            vec!["distributor", "ingester", "querier", "index-gateway", "ruler"]
        );
    }
}
