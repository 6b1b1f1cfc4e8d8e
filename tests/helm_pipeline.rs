//! Exercises the full render-values -> --set pairs -> helm command pipeline
//! used by `appdeploy::deploy`, end to end across the `catalog` and `helm`
//! modules.

use std::collections::HashMap;

use xanthus::catalog::render_values;
use xanthus::helm;

fn parse_set_pairs(rendered: &str) -> Vec<(String, String)> {
    rendered
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[test]
fn descriptor_values_become_a_stable_helm_install_command() {
    let template = "image.tag={{.Version}},ingress.host={{.Subdomain}}.{{.Domain}}";
    let rendered = render_values(template, &HashMap::new(), "4.89.1", "example.com", "ide", &HashMap::new());
    let pairs = parse_set_pairs(&rendered);

    let cmd = helm::install("ide-code-server", "coder/code-server", "4.89.1", "code-server", &pairs);

    assert!(cmd.contains("helm install ide-code-server coder/code-server --version 4.89.1"));
    assert!(cmd.contains("--create-namespace"));
    assert!(cmd.contains("--set image.tag=4.89.1,ingress.host=ide.example.com"));
}
