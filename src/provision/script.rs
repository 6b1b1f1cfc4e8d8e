//! First-boot script composition. One fixed shell program per host with a
//! handful of interpolated values, built with plain `format!` — there is no
//! templating to speak of, so a templating crate would be overkill.

const ARGOCD_INSTALL_MANIFEST_URL: &str =
    "https://raw.githubusercontent.com/argoproj/argo-cd/stable/manifests/install.yaml";
const GET_HELM_URL: &str = "https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3";

/// Renders the cloud-init user-data script for a new host. `ssh_public_key`
/// is the OpenSSH line that should be authorized for the `ssh_user` account;
/// `arch` selects the ArgoCD CLI binary (`amd64` or `arm64`).
pub fn render(ssh_user: &str, ssh_public_key: &str, arch: &str) -> String {
    let argocd_cli_arch = match arch {
        "arm64" | "aarch64" => "arm64",
        _ => "amd64",
    };

    format!(
        r#"#!/bin/bash
set -euo pipefail

STATUS_FILE=/opt/xanthus/status
mkdir -p /opt/xanthus
echo INSTALLING > "$STATUS_FILE"

useradd -m -s /bin/bash {ssh_user} 2>/dev/null || true
mkdir -p /home/{ssh_user}/.ssh
echo '{ssh_public_key}' >> /home/{ssh_user}/.ssh/authorized_keys
chown -R {ssh_user}:{ssh_user} /home/{ssh_user}/.ssh
chmod 700 /home/{ssh_user}/.ssh
chmod 600 /home/{ssh_user}/.ssh/authorized_keys

apt-get update -y
apt-get install -y curl ca-certificates

echo INSTALLING_K3S > "$STATUS_FILE"
curl -sfL https://get.k3s.io | sh -
mkdir -p /home/{ssh_user}/.kube
cp /etc/rancher/k3s/k3s.yaml /home/{ssh_user}/.kube/config
chown -R {ssh_user}:{ssh_user} /home/{ssh_user}/.kube
chmod 600 /home/{ssh_user}/.kube/config
export KUBECONFIG=/etc/rancher/k3s/k3s.yaml

echo WAITING_K3S > "$STATUS_FILE"
until kubectl get nodes 2>/dev/null | grep -q ' Ready'; do sleep 5; done

echo INSTALLING_HELM > "$STATUS_FILE"
curl -fsSL -o get_helm.sh {get_helm_url}
chmod +x get_helm.sh
./get_helm.sh
rm -f get_helm.sh

echo INSTALLING_ARGOCD > "$STATUS_FILE"
kubectl create namespace argocd --dry-run=client -o yaml | kubectl apply -f -
kubectl apply -n argocd -f {argocd_manifest_url}

echo WAITING_ARGOCD > "$STATUS_FILE"
kubectl -n argocd rollout status deployment/argocd-server --timeout=300s

echo INSTALLING_ARGOCD_CLI > "$STATUS_FILE"
curl -fsSL -o /usr/local/bin/argocd https://github.com/argoproj/argo-cd/releases/latest/download/argocd-linux-{argocd_cli_arch}
chmod +x /usr/local/bin/argocd

echo VERIFYING > "$STATUS_FILE"
systemctl is-active --quiet k3s
kubectl get nodes >/dev/null

echo READY > "$STATUS_FILE"
"#,
        ssh_user = ssh_user,
        ssh_public_key = ssh_public_key,
        get_helm_url = GET_HELM_URL,
        argocd_manifest_url = ARGOCD_INSTALL_MANIFEST_URL,
        argocd_cli_arch = argocd_cli_arch,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_writes_all_sentinels_in_order() {
        let script = render("xanthus", "ssh-rsa AAAA", "amd64");
        let order = [
            "INSTALLING",
            "INSTALLING_K3S",
            "WAITING_K3S",
            "INSTALLING_HELM",
            "INSTALLING_ARGOCD",
            "WAITING_ARGOCD",
            "INSTALLING_ARGOCD_CLI",
            "VERIFYING",
            "READY",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|s| script.find(&format!("echo {s} > ")).or_else(|| script.find(&format!("echo {s}\n"))).expect(s))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn arm64_selects_arm64_cli_binary() {
        let script = render("xanthus", "ssh-rsa AAAA", "arm64");
        assert!(script.contains("argocd-linux-arm64"));
    }

    #[test]
    fn unknown_arch_falls_back_to_amd64() {
        let script = render("xanthus", "ssh-rsa AAAA", "riscv64");
        assert!(script.contains("argocd-linux-amd64"));
    }
}
