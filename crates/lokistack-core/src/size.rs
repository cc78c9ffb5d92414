//! Per-size baseline tables
//!
//! Each [`StackSize`] maps to a [`SizeProfile`] (replica counts and global
//! limits) and a [`ComponentResources`] table (requests, volume sizes and
//! disruption budget overrides). Both tables are built once and only ever
//! read afterwards.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use crate::component::Component;
use crate::stack::{
    ComponentSpec, IngestionLimits, LimitsTemplate, QueryLimits, ResourceList,
    ResourceRequirements, StackSize, TemplateSpec,
};

/// Baseline spec values for one size
#[derive(Debug, Clone)]
pub struct SizeProfile {
    pub template: TemplateSpec,
    pub limits: LimitsTemplate,
}

/// Resources for one component
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceProfile {
    pub requirements: ResourceRequirements,
    /// Size of the `storage` claim, for stateful components
    pub pvc_size: Option<String>,
    /// Explicit `minAvailable` for the disruption budget
    pub pdb_min_available: Option<i32>,
}

/// Resource table for every component of one size
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentResources {
    components: BTreeMap<Component, ResourceProfile>,
    /// Compactor retention delete workers
    pub delete_worker_count: u32,
}

impl ComponentResources {
    pub fn get(&self, component: Component) -> Option<&ResourceProfile> {
        self.components.get(&component)
    }

    /// Replace the requirements of one component
    pub fn set_requirements(&mut self, component: Component, requirements: ResourceRequirements) {
        self.components.entry(component).or_default().requirements = requirements;
    }
}

static SIZE_PROFILES: Lazy<BTreeMap<StackSize, SizeProfile>> = Lazy::new(|| {
    StackSize::ALL
        .iter()
        .map(|size| (*size, build_profile(*size)))
        .collect()
});

static RESOURCE_TABLE: Lazy<BTreeMap<StackSize, ComponentResources>> = Lazy::new(|| {
    StackSize::ALL
        .iter()
        .map(|size| (*size, build_resources(*size)))
        .collect()
});

/// Baseline profile for a size
pub fn size_profile(size: StackSize) -> &'static SizeProfile {
    // Every variant is inserted by build_profile.
    &SIZE_PROFILES[&size]
}

/// Resource table for a size
pub fn component_resources(size: StackSize) -> &'static ComponentResources {
    &RESOURCE_TABLE[&size]
}

fn replicas_for(size: StackSize, component: Component) -> i32 {
    match (size, component) {
        (_, Component::Compactor) => 1,
        (StackSize::OneXDemo, _) => 1,
        (StackSize::OneXMedium, Component::Ingester | Component::Querier) => 3,
        _ => 2,
    }
}

fn build_profile(size: StackSize) -> SizeProfile {
    let mut template = TemplateSpec::default();
    for component in Component::ALL {
        *template.component_mut(component) = Some(ComponentSpec {
            replicas: Some(replicas_for(size, component)),
            ..Default::default()
        });
    }

    let (rate, burst, streams) = match size {
        StackSize::OneXDemo | StackSize::OneXExtraSmall => (4, 6, None),
        StackSize::OneXSmall => (15, 20, Some(10_000)),
        StackSize::OneXMedium => (50, 20, Some(25_000)),
    };

    let limits = LimitsTemplate {
        ingestion: Some(IngestionLimits {
            ingestion_rate: Some(rate),
            ingestion_burst_size: Some(burst),
            max_label_name_length: Some(1024),
            max_label_value_length: Some(2048),
            max_label_names_per_series: Some(30),
            max_global_streams_per_tenant: streams,
            max_line_size: Some(256_000),
            per_stream_desired_rate: Some(3),
            per_stream_rate_limit: Some(5),
            per_stream_rate_limit_burst: Some(15),
        }),
        queries: Some(QueryLimits {
            max_entries_limit_per_query: Some(5000),
            max_chunks_per_query: Some(2_000_000),
            max_query_series: Some(500),
            query_timeout: Some("3m".to_string()),
            cardinality_limit: Some(100_000),
            max_volume_series: Some(1000),
        }),
    };

    SizeProfile { template, limits }
}

fn requests(cpu: &str, memory: &str) -> ResourceRequirements {
    ResourceRequirements {
        limits: ResourceList::default(),
        requests: ResourceList::new(cpu, memory),
    }
}

fn profile(requirements: ResourceRequirements, pvc: Option<&str>, pdb: Option<i32>) -> ResourceProfile {
    ResourceProfile {
        requirements,
        pvc_size: pvc.map(str::to_string),
        pdb_min_available: pdb,
    }
}

fn build_resources(size: StackSize) -> ComponentResources {
    use Component::*;

    let none = ResourceRequirements::default;
    let rows: Vec<(Component, ResourceProfile)> = match size {
        StackSize::OneXDemo => vec![
            (Distributor, profile(none(), None, None)),
            (Ingester, profile(none(), Some("10Gi"), None)),
            (Querier, profile(none(), None, None)),
            (QueryFrontend, profile(none(), None, None)),
            (Compactor, profile(none(), Some("10Gi"), None)),
            (IndexGateway, profile(none(), Some("10Gi"), None)),
            (Ruler, profile(none(), Some("10Gi"), None)),
        ],
        StackSize::OneXExtraSmall => vec![
            (Distributor, profile(requests("1", "1Gi"), None, None)),
            (Ingester, profile(requests("2", "8Gi"), Some("10Gi"), Some(1))),
            (Querier, profile(requests("1500m", "3Gi"), None, None)),
            (QueryFrontend, profile(requests("1", "1Gi"), None, None)),
            (Compactor, profile(requests("1", "2Gi"), Some("10Gi"), None)),
            (IndexGateway, profile(requests("500m", "1Gi"), Some("50Gi"), None)),
            (Ruler, profile(requests("1", "2Gi"), Some("10Gi"), None)),
        ],
        StackSize::OneXSmall => vec![
            (Distributor, profile(requests("2", "2Gi"), None, None)),
            (Ingester, profile(requests("4", "20Gi"), Some("10Gi"), Some(1))),
            (Querier, profile(requests("4", "4Gi"), None, None)),
            (QueryFrontend, profile(requests("4", "2560Mi"), None, None)),
            (Compactor, profile(requests("2", "4Gi"), Some("10Gi"), None)),
            (IndexGateway, profile(requests("1", "2Gi"), Some("50Gi"), None)),
            (Ruler, profile(requests("1", "8Gi"), Some("10Gi"), None)),
        ],
        StackSize::OneXMedium => vec![
            (Distributor, profile(requests("2", "2Gi"), None, None)),
            (Ingester, profile(requests("6", "30Gi"), Some("10Gi"), Some(2))),
            (Querier, profile(requests("6", "10Gi"), None, None)),
            (QueryFrontend, profile(requests("4", "2560Mi"), None, None)),
            (Compactor, profile(requests("2", "4Gi"), Some("10Gi"), None)),
            (IndexGateway, profile(requests("1", "2Gi"), Some("50Gi"), None)),
            (Ruler, profile(requests("8", "16Gi"), Some("10Gi"), None)),
        ],
    };

    let delete_worker_count = match size {
        StackSize::OneXDemo | StackSize::OneXExtraSmall => 10,
        StackSize::OneXSmall | StackSize::OneXMedium => 150,
    };

    ComponentResources {
        components: rows.into_iter().collect(),
        delete_worker_count,
    }
}

/// Whole CPU cores for a quantity, rounded up (`1500m` -> 2, `500m` -> 1)
pub fn cpu_cores(quantity: &str) -> Option<u32> {
    let quantity = quantity.trim();
    let millis: f64 = match quantity.strip_suffix('m') {
        Some(m) => m.parse().ok()?,
        None => quantity.parse::<f64>().ok()? * 1000.0,
    };
    if millis < 0.0 {
        return None;
    }
    Some((millis / 1000.0).ceil() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_size_has_a_profile() {
        for size in StackSize::ALL {
            let profile = size_profile(size);
            for component in Component::ALL {
                let spec = profile.template.component(component).unwrap();
                assert!(spec.replicas.unwrap() >= 1, "{size} {component}");
                assert!(component_resources(size).get(component).is_some());
            }
        }
    }

    #[test]
    fn test_medium_replicas() {
        let template = &size_profile(StackSize::OneXMedium).template;
        let replicas = |c| template.component(c).unwrap().replicas.unwrap();
        assert_eq!(replicas(Component::Ingester), 3);
        assert_eq!(replicas(Component::Querier), 3);
        assert_eq!(replicas(Component::Distributor), 2);
        assert_eq!(replicas(Component::Compactor), 1);
    }

    #[test]
    fn test_small_limits() {
        let limits = &size_profile(StackSize::OneXSmall).limits;
        let ingestion = limits.ingestion.as_ref().unwrap();
        assert_eq!(ingestion.ingestion_rate, Some(15));
        assert_eq!(ingestion.max_global_streams_per_tenant, Some(10_000));
        let queries = limits.queries.as_ref().unwrap();
        assert_eq!(queries.query_timeout.as_deref(), Some("3m"));
    }

    #[test]
    fn test_resource_table_overrides() {
        let table = component_resources(StackSize::OneXMedium);
        let ingester = table.get(Component::Ingester).unwrap();
        assert_eq!(ingester.pdb_min_available, Some(2));
        assert_eq!(ingester.pvc_size.as_deref(), Some("10Gi"));
        assert_eq!(table.delete_worker_count, 150);

        let demo = component_resources(StackSize::OneXDemo);
        assert!(demo.get(Component::Querier).unwrap().requirements.requests.is_empty());
    }

    #[test]
    fn test_cpu_cores() {
        assert_eq!(cpu_cores("1500m"), Some(2));
        assert_eq!(cpu_cores("500m"), Some(1));
        assert_eq!(cpu_cores("4"), Some(4));
        assert_eq!(cpu_cores("1.5"), Some(2));
        assert_eq!(cpu_cores("lots"), None);
    }
}
