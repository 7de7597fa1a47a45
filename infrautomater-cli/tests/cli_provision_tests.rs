//! End-to-end runs against a fake provisioning binary.
//!
//! Kept to a single test so no other test forks while the script is open
//! for writing.
#![cfg(unix)]

use infrautomater_core::models::{RequestStatus, ResourceRequest};
use infrautomater_core::store::{JsonRequestStore, RequestStore};
use std::os::unix::fs::PermissionsExt;
use std::process::{Command, Output};

const FAKE_TERRAFORM: &str = r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
case "$1" in
  version) echo "Terraform v1.6.6" ;;
  plan) echo "Plan: 1 to add, 0 to change, 0 to destroy." ;;
  apply) echo "Apply complete! Resources: 1 added, 0 changed, 0 destroyed." ;;
  output) echo '{"bucket_name": {"sensitive": false, "value": "my-bucket"}}' ;;
  destroy) echo "Destroy complete! Resources: 1 destroyed." ;;
  *) echo "$1 ok" ;;
esac
"#;

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_infrautomater"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run infrautomater")
}

#[test]
fn test_provision_and_destroy_with_fake_binary() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    let binary = root.join("terraform");
    std::fs::write(&binary, FAKE_TERRAFORM).unwrap();
    std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config_path = root.join("worker.toml");
    std::fs::write(
        &config_path,
        format!(
            "terraform_binary = \"{}\"\nworkspaces_root = \"{}\"\nmodules_root = \"{}\"\nstore_path = \"{}\"\n",
            binary.display(),
            root.join("workspaces").display(),
            root.join("modules").display(),
            root.join("requests.json").display(),
        ),
    )
    .unwrap();
    let config = config_path.display().to_string();

    let store = JsonRequestStore::new(root.join("requests.json")).unwrap();
    let mut request = ResourceRequest::new(1, 4, "s3", "my-bucket");
    request.status = RequestStatus::Approved;
    request
        .config
        .insert("region".to_string(), serde_json::json!("eu-west-1"));
    store.upsert_request(request).unwrap();

    // Dry run by default: plan only
    let output = run(&["--config", &config, "provision", "1", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["status"], "provisioned");

    let stored = store.load_request(1).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Provisioned);
    assert!(stored.notes().contains("[DRY RUN]"));
    assert!(stored.notes().contains("eu-west-1"));

    let calls = std::fs::read_to_string(root.join("calls.log")).unwrap();
    assert!(!calls.contains("apply"));

    // Re-approve and run live
    let mut stored = stored;
    stored.status = RequestStatus::Approved;
    store.upsert_request(stored).unwrap();

    let output = run(&["--config", &config, "--live", "provision", "1"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("bucket_name: my-bucket"));

    let calls = std::fs::read_to_string(root.join("calls.log")).unwrap();
    assert!(calls.contains("apply -input=false -no-color -auto-approve tfplan"));

    let output = run(&["--config", &config, "--live", "destroy", "1"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stored = store.load_request(1).unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Destroyed);
    assert!(!root.join("workspaces").join("request-1").exists());
}
