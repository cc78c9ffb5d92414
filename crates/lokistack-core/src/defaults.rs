//! Spec defaulting
//!
//! Merges a user spec with the baseline profile of its size in three layers:
//!
//! 1. **Baseline**: [`crate::size::size_profile`] for `spec.size`
//! 2. **User**: any field the user set wins, field by field
//! 3. **Strict overrides**: values that win over both layers
//!
//! Precedence per field group:
//!
//! | Group                         | Source                                   |
//! |-------------------------------|------------------------------------------|
//! | `limits.global.*`             | user if set, else baseline               |
//! | `limits.tenants.*`            | user only                                |
//! | `template.<c>.replicas`       | strict override, else user, else baseline |
//! | `template.<c>.resources`      | user if set, else resource table         |
//! | `template.<c>.tolerations`    | user only                                |
//! | `template.<c>.nodeSelector`   | user only                                |
//! | `template.<c>.podAntiAffinity`| user only                                |
//! | everything else               | user only                                |

use std::time::Duration;

use crate::component::Component;
use crate::error::{CoreError, Result};
use crate::size::{ComponentResources, component_resources, size_profile};
use crate::stack::{
    ComponentSpec, IngestionLimits, LimitsSpec, LimitsTemplate, LokiStackSpec, QueryLimits,
    TemplateSpec,
};
use crate::timeouts::parse_query_timeout;

/// Components that must run exactly one replica
pub const SINGLETON_COMPONENTS: &[Component] = &[Component::Compactor];

/// Result of defaulting a stack spec
#[derive(Debug, Clone)]
pub struct DefaultedStack {
    /// Spec with `limits.global` and every `template` slot populated
    pub spec: LokiStackSpec,
    /// Resource table for the stack size, with user overrides applied
    pub resources: ComponentResources,
    /// Parsed global query timeout
    pub query_timeout: Duration,
}

impl DefaultedStack {
    /// Replica count of a component after merging
    pub fn replicas(&self, component: Component) -> i32 {
        self.spec
            .template
            .as_ref()
            .and_then(|t| t.component(component))
            .and_then(|c| c.replicas)
            .unwrap_or(1)
    }

    pub fn global_limits(&self) -> Option<&LimitsTemplate> {
        self.spec.limits.as_ref().and_then(|l| l.global.as_ref())
    }
}

/// Merge the user spec with the size baseline and apply strict overrides
pub fn apply_default_settings(user: &LokiStackSpec) -> Result<DefaultedStack> {
    let profile = size_profile(user.size);
    let mut spec = user.clone();

    let user_limits = user.limits.clone().unwrap_or_default();
    let global = merge_limits(&profile.limits, user_limits.global.as_ref());
    spec.limits = Some(LimitsSpec {
        global: Some(global),
        tenants: user_limits.tenants,
    });

    let mut template = merge_template(&profile.template, user.template.as_ref());
    for component in SINGLETON_COMPONENTS {
        template
            .component_mut(*component)
            .get_or_insert_with(ComponentSpec::default)
            .replicas = Some(1);
    }
    spec.template = Some(template);

    validate_merged(&spec)?;

    let query_timeout = spec
        .limits
        .as_ref()
        .and_then(|l| l.global.as_ref())
        .and_then(|g| g.queries.as_ref())
        .and_then(|q| q.query_timeout.as_deref())
        .map(parse_query_timeout)
        .transpose()?
        .ok_or_else(|| CoreError::config("global query timeout is not set"))?;

    let mut resources = component_resources(user.size).clone();
    if let Some(template) = &spec.template {
        for component in Component::ALL {
            if let Some(requirements) = template.component(component).and_then(|c| c.resources.clone()) {
                resources.set_requirements(component, requirements);
            }
        }
    }

    Ok(DefaultedStack {
        spec,
        resources,
        query_timeout,
    })
}

fn overlay<T: Clone>(base: &mut Option<T>, user: &Option<T>) {
    if user.is_some() {
        base.clone_from(user);
    }
}

fn merge_limits(base: &LimitsTemplate, user: Option<&LimitsTemplate>) -> LimitsTemplate {
    let Some(user) = user else {
        return base.clone();
    };

    LimitsTemplate {
        ingestion: Some(merge_ingestion(
            base.ingestion.clone().unwrap_or_default(),
            user.ingestion.as_ref(),
        )),
        queries: Some(merge_queries(
            base.queries.clone().unwrap_or_default(),
            user.queries.as_ref(),
        )),
    }
}

fn merge_ingestion(mut base: IngestionLimits, user: Option<&IngestionLimits>) -> IngestionLimits {
    if let Some(user) = user {
        overlay(&mut base.ingestion_rate, &user.ingestion_rate);
        overlay(&mut base.ingestion_burst_size, &user.ingestion_burst_size);
        overlay(&mut base.max_label_name_length, &user.max_label_name_length);
        overlay(&mut base.max_label_value_length, &user.max_label_value_length);
        overlay(&mut base.max_label_names_per_series, &user.max_label_names_per_series);
        overlay(&mut base.max_global_streams_per_tenant, &user.max_global_streams_per_tenant);
        overlay(&mut base.max_line_size, &user.max_line_size);
        overlay(&mut base.per_stream_desired_rate, &user.per_stream_desired_rate);
        overlay(&mut base.per_stream_rate_limit, &user.per_stream_rate_limit);
        overlay(&mut base.per_stream_rate_limit_burst, &user.per_stream_rate_limit_burst);
    }
    base
}

fn merge_queries(mut base: QueryLimits, user: Option<&QueryLimits>) -> QueryLimits {
    if let Some(user) = user {
        overlay(&mut base.max_entries_limit_per_query, &user.max_entries_limit_per_query);
        overlay(&mut base.max_chunks_per_query, &user.max_chunks_per_query);
        overlay(&mut base.max_query_series, &user.max_query_series);
        overlay(&mut base.query_timeout, &user.query_timeout);
        overlay(&mut base.cardinality_limit, &user.cardinality_limit);
        overlay(&mut base.max_volume_series, &user.max_volume_series);
    }
    base
}

fn merge_template(base: &TemplateSpec, user: Option<&TemplateSpec>) -> TemplateSpec {
    let mut merged = base.clone();
    let Some(user) = user else {
        return merged;
    };

    for component in Component::ALL {
        let Some(user_spec) = user.component(component) else {
            continue;
        };
        let slot = merged
            .component_mut(component)
            .get_or_insert_with(ComponentSpec::default);

        overlay(&mut slot.replicas, &user_spec.replicas);
        overlay(&mut slot.resources, &user_spec.resources);
        overlay(&mut slot.pod_anti_affinity, &user_spec.pod_anti_affinity);
        slot.tolerations.clone_from(&user_spec.tolerations);
        slot.node_selector.clone_from(&user_spec.node_selector);
    }
    merged
}

fn validate_merged(spec: &LokiStackSpec) -> Result<()> {
    if let Some(template) = &spec.template {
        for component in Component::ALL {
            if let Some(replicas) = template.component(component).and_then(|c| c.replicas) {
                if replicas < 0 {
                    return Err(CoreError::config(format!(
                        "template.{}.replicas must not be negative, got {}",
                        component, replicas
                    )));
                }
            }
        }
    }

    if let Some(factor) = spec.replication.as_ref().and_then(|r| r.factor) {
        if factor < 1 {
            return Err(CoreError::config(format!(
                "replication.factor must be at least 1, got {}",
                factor
            )));
        }
    }

    if let Some(limits) = &spec.limits {
        for (tenant, tenant_limits) in &limits.tenants {
            if let Some(timeout) = tenant_limits
                .queries
                .as_ref()
                .and_then(|q| q.query_timeout.as_deref())
            {
                parse_query_timeout(timeout).map_err(|_| CoreError::InvalidDuration {
                    field: format!("limits.tenants.{}.queries.queryTimeout", tenant),
                    value: timeout.to_string(),
                })?;
            }
        }
    }

    Ok(())
}
