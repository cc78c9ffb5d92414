//! Pod disruption budgets

use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use lokistack_core::Component;

use super::var;
use crate::options::Options;

/// `minAvailable` for a component: the table override capped at the replica
/// count, else one less than the replica count. Never below one.
pub fn min_available(replicas: i32, table_override: Option<i32>) -> i32 {
    match table_override {
        Some(min) => min.min(replicas).max(1),
        None => (replicas - 1).max(1),
    }
}

/// Disruption budget for a component, `None` for components without one
pub fn build_pod_disruption_budget(opts: &Options, component: Component) -> Option<PodDisruptionBudget> {
    if !component.has_disruption_budget() {
        return None;
    }

    let table_override = opts
        .resources
        .get(component)
        .and_then(|p| p.pdb_min_available);
    let labels = var::component_labels(&opts.name, component);

    Some(PodDisruptionBudget {
        metadata: ObjectMeta {
            name: Some(var::component_name(&opts.name, component)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PodDisruptionBudgetSpec {
            min_available: Some(IntOrString::Int(min_available(
                opts.replicas(component),
                table_override,
            ))),
            selector: Some(LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::fixtures::{options, options_for, spec};
    use lokistack_core::StackSize;
    use lokistack_core::stack::{ComponentSpec, TemplateSpec};

    #[test]
    fn test_min_available() {
        assert_eq!(min_available(1, None), 1);
        assert_eq!(min_available(2, None), 1);
        assert_eq!(min_available(3, None), 2);
        assert_eq!(min_available(0, None), 1);
        assert_eq!(min_available(3, Some(1)), 1);
        assert_eq!(min_available(1, Some(2)), 1);
        assert_eq!(min_available(0, Some(2)), 1);
    }

    #[test]
    fn test_budget_uses_table_override() {
        let opts = options(StackSize::OneXMedium);
        let pdb = build_pod_disruption_budget(&opts, Component::Ingester).unwrap();
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(2)));

        let pdb = build_pod_disruption_budget(&opts, Component::Querier).unwrap();
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(2)));

        let pdb = build_pod_disruption_budget(&opts, Component::Distributor).unwrap();
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(1)));
    }

    #[test]
    fn test_table_override_capped_by_replicas() {
        let mut s = spec(StackSize::OneXMedium);
        s.template = Some(TemplateSpec {
            ingester: Some(ComponentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        });
        let pdb = build_pod_disruption_budget(&options_for(&s), Component::Ingester).unwrap();
        assert_eq!(pdb.spec.unwrap().min_available, Some(IntOrString::Int(1)));
    }

    #[test]
    fn test_compactor_has_no_budget() {
        let opts = options(StackSize::OneXSmall);
        assert!(build_pod_disruption_budget(&opts, Component::Compactor).is_none());
    }
}
