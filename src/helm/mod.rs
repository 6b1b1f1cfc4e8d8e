//! Helm driver (C6): pure command construction, separate from execution.
//! `ssh::execute` is the "apply" step — this module only builds command
//! text, the same separation the kubernetes manifest builder draws between
//! constructing typed structs and calling `kube::Api::apply`.

pub mod status;

pub use status::{parse_status, HelmReleaseStatus};

/// `--set` pairs sorted lexicographically by key so the emitted command is
/// stable across calls with the same (possibly unordered) map.
fn set_flag(values: &[(String, String)]) -> String {
    if values.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<&(String, String)> = values.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let joined = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!(" --set {joined}")
}

pub fn install(
    release: &str,
    chart: &str,
    version: &str,
    namespace: &str,
    values: &[(String, String)],
) -> String {
    format!(
        "kubectl create namespace {namespace} --dry-run=client -o yaml | kubectl apply -f - && \
         helm install {release} {chart} --version {version} --namespace {namespace} --create-namespace{}",
        set_flag(values)
    )
}

pub fn upgrade(
    release: &str,
    chart: &str,
    version: &str,
    namespace: &str,
    values: &[(String, String)],
) -> String {
    format!(
        "helm upgrade {release} {chart} --version {version} --namespace {namespace}{}",
        set_flag(values)
    )
}

pub fn uninstall(release: &str, namespace: &str) -> String {
    format!("helm uninstall {release} --namespace {namespace}")
}

pub fn status_command(release: &str, namespace: &str) -> String {
    format!("helm status {release} --namespace {namespace} -o json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_omits_set_flag_when_no_values() {
        let cmd = install("myapp", "repo/chart", "1.2.3", "myapp-ns", &[]);
        assert!(!cmd.contains("--set"));
        assert!(cmd.contains("helm install myapp repo/chart --version 1.2.3"));
    }

    #[test]
    fn install_sorts_set_values_lexicographically() {
        let values = vec![
            ("zeta".to_string(), "1".to_string()),
            ("alpha".to_string(), "2".to_string()),
        ];
        let cmd = install("myapp", "repo/chart", "1.2.3", "myapp-ns", &values);
        assert!(cmd.contains("--set alpha=2,zeta=1"));
    }

    #[test]
    fn uninstall_targets_release_and_namespace() {
        assert_eq!(
            uninstall("myapp", "myapp-ns"),
            "helm uninstall myapp --namespace myapp-ns"
        );
    }
}
