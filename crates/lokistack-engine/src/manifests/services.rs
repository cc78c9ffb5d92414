//! Services exposing each component and the gossip ring

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use lokistack_core::Component;

use super::var;
use crate::options::Options;

/// HTTP and gRPC services for a component
pub fn build_services(opts: &Options, component: Component) -> Vec<Service> {
    let labels = var::component_labels(&opts.name, component);

    let http = Service {
        metadata: ObjectMeta {
            name: Some(var::http_service_name(&opts.name, component)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![service_port(var::HTTP_PORT_NAME, var::HTTP_PORT)]),
            selector: Some(labels.clone()),
            ..Default::default()
        }),
        ..Default::default()
    };

    // Headless so clients resolve every replica
    let grpc = Service {
        metadata: ObjectMeta {
            name: Some(var::grpc_service_name(&opts.name, component)),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            ports: Some(vec![service_port(var::GRPC_PORT_NAME, var::GRPC_PORT)]),
            selector: Some(labels),
            ..Default::default()
        }),
        ..Default::default()
    };

    vec![http, grpc]
}

/// Headless service selecting every ring member of the stack
pub fn build_gossip_ring_service(opts: &Options) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(var::gossip_ring_service_name(&opts.name)),
            labels: Some(var::common_labels(&opts.name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            ports: Some(vec![service_port(var::GOSSIP_PORT_NAME, var::GOSSIP_PORT)]),
            selector: Some(var::gossip_labels(&opts.name)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::fixtures::options;
    use lokistack_core::StackSize;

    #[test]
    fn test_component_services() {
        let opts = options(StackSize::OneXSmall);
        let services = build_services(&opts, Component::Querier);

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].metadata.name.as_deref(), Some("lokistack-dev-querier-http"));
        let grpc = services[1].spec.as_ref().unwrap();
        assert_eq!(grpc.cluster_ip.as_deref(), Some("None"));
        assert_eq!(grpc.ports.as_ref().unwrap()[0].port, 9095);
    }

    #[test]
    fn test_gossip_ring_selects_ring_members() {
        let svc = build_gossip_ring_service(&options(StackSize::OneXSmall));
        let spec = svc.spec.unwrap();
        let selector = spec.selector.unwrap();

        assert_eq!(selector.get(var::LABEL_GOSSIP).map(String::as_str), Some("true"));
        assert!(!selector.contains_key(var::LABEL_COMPONENT));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
    }
}
