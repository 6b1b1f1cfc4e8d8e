//! The setup-status sentinel vocabulary written by the first-boot script to
//! `/opt/xanthus/status`, and the fixed forward order hosts progress through.

/// Returns `true` if `to` is a legal next sentinel after `from`. The
/// sequence is strictly linear; a host never regresses except by restarting
/// the whole provisioning run (not modeled here — that allocates a fresh
/// host record).
pub fn is_valid_transition(from: &str, to: &str) -> bool {
    let order = SENTINEL_ORDER;
    let from_idx = order.iter().position(|s| *s == from);
    let to_idx = order.iter().position(|s| *s == to);
    match (from_idx, to_idx) {
        (Some(f), Some(t)) => t == f + 1,
        _ => false,
    }
}

pub const SENTINEL_ORDER: &[&str] = &[
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

pub fn is_terminal(status: &str) -> bool {
    status == "READY"
}

/// States the UI should poll more frequently for (every 5s instead of 10s).
pub fn is_transitional_host_status(status: &str) -> bool {
    matches!(status, "initializing" | "starting" | "stopping")
}

/// Maps a sentinel to the sentence shown to the operator while polling.
pub fn setup_message(sentinel: &str) -> String {
    match sentinel {
        "INSTALLING" => "Installing base packages…",
        "INSTALLING_K3S" => "Installing the k3s cluster…",
        "WAITING_K3S" => "Waiting for the k3s cluster to become ready…",
        "INSTALLING_HELM" => "Installing Helm…",
        "INSTALLING_ARGOCD" => "Installing ArgoCD…",
        "WAITING_ARGOCD" => "Waiting for ArgoCD to become ready…",
        "INSTALLING_ARGOCD_CLI" => "Installing the ArgoCD CLI…",
        "VERIFYING" => "Running final checks…",
        "READY" => "Host is ready.",
        "UNKNOWN" => "Host status is unknown; it may still be booting.",
        other => return format!("Unrecognised setup status `{other}`."),
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_sequence_advances_one_step_at_a_time() {
        assert!(is_valid_transition("INSTALLING", "INSTALLING_K3S"));
        assert!(!is_valid_transition("INSTALLING", "WAITING_K3S"));
        assert!(!is_valid_transition("READY", "INSTALLING"));
    }

    #[test]
    fn ready_is_terminal() {
        assert!(is_terminal("READY"));
        assert!(!is_terminal("VERIFYING"));
    }

    #[test]
    fn unknown_sentinel_gets_a_generic_message() {
        assert!(setup_message("GARBAGE").contains("Unrecognised"));
    }
}
