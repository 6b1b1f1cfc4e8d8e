//! Loads the real `catalog/` directory shipped at the repo root and checks
//! both shipped descriptors parse, validate, and render end to end.

use std::path::Path;

use xanthus::catalog::{load_dir, render_values};

#[test]
fn loads_shipped_descriptors() {
    let catalog = load_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("catalog").as_path())
        .expect("catalog directory should load");

    assert!(catalog.get("code-server").is_some());
    assert!(catalog.get("argocd").is_some());
    assert_eq!(catalog.len(), 2);
}

#[test]
fn code_server_values_render_with_subdomain_and_domain() {
    let catalog = load_dir(Path::new(env!("CARGO_MANIFEST_DIR")).join("catalog").as_path())
        .expect("catalog directory should load");
    let descriptor = catalog.get("code-server").expect("code-server descriptor present");

    let rendered = render_values(
        &descriptor.helm_chart.values_template,
        &descriptor.helm_chart.placeholders,
        "4.89.1",
        "example.com",
        "ide",
        &std::collections::HashMap::new(),
    );

    assert!(rendered.contains("image.tag=4.89.1"));
    assert!(rendered.contains("ingress.host=ide.example.com"));
}
