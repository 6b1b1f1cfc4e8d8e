//! Extra port-forward manifests: a `Service` and an `Ingress` per forward,
//! built with `k8s-openapi` typed structs and shipped to the target host as
//! a YAML heredoc, since C4's exec has no stdin channel.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

use crate::model::PortForward;

fn labels(app_id: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app.kubernetes.io/managed-by".to_string(), "xanthus".to_string());
    labels.insert("xanthus.io/application-id".to_string(), app_id.to_string());
    labels
}

fn resource_name(app_id: &str, forward_id: &str) -> String {
    format!("xanthus-pf-{app_id}-{forward_id}")
}

fn service(app_id: &str, namespace: &str, release_selector: &str, forward: &PortForward) -> Service {
    let mut selector = BTreeMap::new();
    selector.insert("app.kubernetes.io/instance".to_string(), release_selector.to_string());

    Service {
        metadata: ObjectMeta {
            name: Some(resource_name(app_id, &forward.id)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(app_id)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("forward".to_string()),
                port: forward.container_port as i32,
                target_port: Some(IntOrString::Int(forward.container_port as i32)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ingress(app_id: &str, namespace: &str, domain: &str, forward: &PortForward) -> Ingress {
    let host = format!("{}.{domain}", forward.subdomain);
    Ingress {
        metadata: ObjectMeta {
            name: Some(resource_name(app_id, &forward.id)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(app_id)),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some("traefik".to_string()),
            rules: Some(vec![IngressRule {
                host: Some(host.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: resource_name(app_id, &forward.id),
                                port: Some(ServiceBackendPort {
                                    name: Some("forward".to_string()),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// One heredoc-wrapped `kubectl apply` for the Service+Ingress pair.
pub fn apply_command(
    app_id: &str,
    namespace: &str,
    release_selector: &str,
    domain: &str,
    forward: &PortForward,
) -> Result<String, String> {
    let manifests = vec![
        serde_yaml::to_string(&service(app_id, namespace, release_selector, forward)),
        serde_yaml::to_string(&ingress(app_id, namespace, domain, forward)),
    ];
    let mut yaml = String::new();
    for manifest in manifests {
        let manifest = manifest.map_err(|e| format!("failed to render port-forward manifest: {e}"))?;
        yaml.push_str(&manifest);
        yaml.push_str("---\n");
    }
    let path = format!("/tmp/xanthus-pf-{}.yaml", forward.id);
    Ok(format!(
        "cat > {path} <<'EOF'\n{yaml}EOF\nkubectl apply -f {path}"
    ))
}

/// Deletes both resources by the same deterministic name the apply used.
pub fn delete_command(app_id: &str, namespace: &str, forward_id: &str) -> String {
    let name = resource_name(app_id, forward_id);
    format!(
        "kubectl delete service {name} --namespace {namespace} --ignore-not-found && \
         kubectl delete ingress {name} --namespace {namespace} --ignore-not-found"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forward() -> PortForward {
        PortForward {
            id: "abcd1234".into(),
            container_port: 9000,
            subdomain: "metrics".into(),
        }
    }

    #[test]
    fn apply_command_contains_both_manifests_and_kubectl_apply() {
        let cmd = apply_command("app-1", "code-server", "code-server", "example.com", &forward()).unwrap();
        assert!(cmd.contains("kind: Service"));
        assert!(cmd.contains("kind: Ingress"));
        assert!(cmd.contains("kubectl apply -f /tmp/xanthus-pf-abcd1234.yaml"));
        assert!(cmd.contains("metrics.example.com"));
    }

    #[test]
    fn delete_command_targets_both_resource_kinds() {
        let cmd = delete_command("app-1", "code-server", "abcd1234");
        assert!(cmd.contains("kubectl delete service xanthus-pf-app-1-abcd1234"));
        assert!(cmd.contains("kubectl delete ingress xanthus-pf-app-1-abcd1234"));
    }
}
