//! Initial-admin-credential extraction for the catalog entries that expose
//! one: code-server (a `--auth password` flag written to a config file) and
//! ArgoCD (a Kubernetes secret seeded on first install).

/// Descriptor ids that expose an extractable initial admin credential.
/// Anything else is assumed to have no such secret.
pub fn extraction_command(app_type: &str, namespace: &str) -> Option<String> {
    match app_type {
        "code-server" => Some(format!(
            "kubectl -n {namespace} exec deploy/code-server -- \
             cat /home/coder/.config/code-server/config.yaml | grep password | awk '{{print $2}}'"
        )),
        "argocd" => Some(format!(
            "kubectl -n {namespace} get secret argocd-initial-admin-secret \
             -o jsonpath=\"{{.data.password}}\" | base64 -d"
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_server_gets_a_command() {
        assert!(extraction_command("code-server", "code-server").is_some());
    }

    #[test]
    fn argocd_gets_a_command() {
        let cmd = extraction_command("argocd", "argocd").unwrap();
        assert!(cmd.contains("argocd-initial-admin-secret"));
    }

    #[test]
    fn unknown_app_type_has_no_credential() {
        assert!(extraction_command("postgres", "postgres").is_none());
    }
}
