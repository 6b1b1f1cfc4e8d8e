//! Host-side SSL installation (run both from VM creation, when a domain was
//! pre-selected, and from the explicit `/vps/:id/configure` endpoint):
//! write the certificate and key, patch the ingress, and restart k3s,
//! rolling back the written files if the restart doesn't come back within
//! the poll window.

use std::time::Duration;

use tokio::time::sleep;

use crate::error::XanthusError;
use crate::ssh::{PoolKey, SshPool};

const RESTART_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RESTART_POLL_DEADLINE: Duration = Duration::from_secs(60);
const COMMAND_DEADLINE: Duration = Duration::from_secs(30);

const SSL_DIR: &str = "/opt/xanthus/ssl";

/// Installs `certificate_pem`/`private_key_pem` on the host behind `key`,
/// patches the ingress, and waits for k3s to come back up. On failure past
/// the write steps, the written files are removed before returning.
pub async fn install(
    ssh: &SshPool,
    key: &PoolKey,
    private_key_pem: &str,
    certificate_pem: &str,
    tls_private_key_pem: &str,
) -> Result<(), XanthusError> {
    ssh.execute(key, private_key_pem, &format!("mkdir -p {SSL_DIR}"), COMMAND_DEADLINE)
        .await?;

    write_file(ssh, key, private_key_pem, &format!("{SSL_DIR}/server.crt"), certificate_pem, "644").await?;
    write_file(ssh, key, private_key_pem, &format!("{SSL_DIR}/server.key"), tls_private_key_pem, "600").await?;

    if let Err(e) = patch_ingress(ssh, key, private_key_pem).await {
        cleanup(ssh, key, private_key_pem).await;
        return Err(e);
    }

    if let Err(e) = restart_and_wait(ssh, key, private_key_pem).await {
        cleanup(ssh, key, private_key_pem).await;
        return Err(e);
    }

    Ok(())
}

async fn write_file(
    ssh: &SshPool,
    key: &PoolKey,
    private_key_pem: &str,
    path: &str,
    contents: &str,
    mode: &str,
) -> Result<(), XanthusError> {
    let command = format!(
        "cat > {path} <<'EOF'\n{contents}\nEOF\nchmod {mode} {path}"
    );
    ssh.execute(key, private_key_pem, &command, COMMAND_DEADLINE).await?;
    Ok(())
}

/// Points the k3s traefik ingress controller's default TLS store at the
/// files just written. The manifest fragment is applied with `kubectl patch`
/// rather than a full apply since it touches an existing resource.
async fn patch_ingress(ssh: &SshPool, key: &PoolKey, private_key_pem: &str) -> Result<(), XanthusError> {
    let command = format!(
        "kubectl create secret tls xanthus-origin-tls --cert={SSL_DIR}/server.crt --key={SSL_DIR}/server.key \
         --namespace kube-system --dry-run=client -o yaml | kubectl apply -f - && \
         kubectl patch deployment traefik --namespace kube-system --type=json \
         -p '[{{\"op\":\"add\",\"path\":\"/spec/template/spec/volumes/-\",\"value\":{{\"name\":\"xanthus-origin-tls\",\"secret\":{{\"secretName\":\"xanthus-origin-tls\"}}}}}}]'"
    );
    ssh.execute(key, private_key_pem, &command, COMMAND_DEADLINE).await?;
    Ok(())
}

async fn restart_and_wait(ssh: &SshPool, key: &PoolKey, private_key_pem: &str) -> Result<(), XanthusError> {
    ssh.execute(key, private_key_pem, "systemctl restart k3s", COMMAND_DEADLINE)
        .await?;

    let started = tokio::time::Instant::now();
    loop {
        let status = ssh
            .execute(key, private_key_pem, "systemctl is-active k3s", COMMAND_DEADLINE)
            .await
            .map(|r| r.stdout.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if status == "active" {
            return Ok(());
        }
        if started.elapsed() >= RESTART_POLL_DEADLINE {
            return Err(XanthusError::CommandFailure {
                command: "systemctl restart k3s".to_string(),
                exit_code: -1,
                output: format!("k3s did not become active within {RESTART_POLL_DEADLINE:?}, last status `{status}`"),
            });
        }
        sleep(RESTART_POLL_INTERVAL).await;
    }
}

async fn cleanup(ssh: &SshPool, key: &PoolKey, private_key_pem: &str) {
    let _ = ssh
        .execute(
            key,
            private_key_pem,
            &format!("rm -f {SSL_DIR}/server.crt {SSL_DIR}/server.key"),
            COMMAND_DEADLINE,
        )
        .await;
}
