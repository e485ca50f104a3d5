use std::fs;

use kubemerge::{
    merge, merge_file, read_extension, write_extension, ClusterDescriptor, Error, KubeConfig,
    UserSpec,
};

const EXISTING_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- cluster:
    server: https://existing.example.org
  name: existing
users:
- name: existing
current-context: existing
contexts:
- context:
  name: existing
"#;

fn new_cluster() -> ClusterDescriptor {
    ClusterDescriptor {
        name: "test".into(),
        project: Some("test".into()),
        api_endpoint: "https://new.example.org".into(),
        oidc_issuer_url: Some("https://auth.example.org".into()),
        oidc_client_id: Some("some-client-id".into()),
        ..Default::default()
    }
}

#[test]
fn merges_into_an_existing_kubeconfig() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubeconfig.yaml");
    fs::write(&path, EXISTING_KUBECONFIG).unwrap();

    let name = merge_file(&path, &new_cluster(), Some("test"), false, None).unwrap();
    assert_eq!(name, "test");

    let merged = KubeConfig::load(&path).unwrap();
    assert_eq!(merged.contexts.len(), 2);
    assert!(merged.contexts.contains_key("existing"));
    assert!(merged.contexts.contains_key("test"));
    assert_eq!(merged.current_context, "test");
    assert_eq!(merged.clusters["existing"].server, "https://existing.example.org");
    assert_eq!(merged.clusters["test"].server, "https://new.example.org");
    assert!(merged.users["test"].exec().is_none());
}

#[test]
fn merging_twice_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    fs::write(&path, EXISTING_KUBECONFIG).unwrap();

    merge_file(&path, &new_cluster(), None, true, Some("acme")).unwrap();
    let once = fs::read_to_string(&path).unwrap();
    merge_file(&path, &new_cluster(), None, true, Some("acme")).unwrap();
    let twice = fs::read_to_string(&path).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn unrelated_entries_survive_untouched() {
    let existing = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://prod.example.org:6443
    certificate-authority-data: Zm9v
    tls-server-name: prod.internal
users:
- name: admin
  user:
    client-certificate-data: Y2VydA==
    client-key-data: a2V5
- name: sso
  user:
    auth-provider:
      name: oidc
      config:
        idp-issuer-url: https://sso.example.org
contexts:
- name: prod
  context:
    cluster: prod
    user: admin
    namespace: kube-system
    extensions:
    - name: other-tool
      extension:
        color: red
current-context: prod
preferences:
  colors: true
"#;
    let before: KubeConfig = kubemerge::direct::KubeConfig::parse(existing).unwrap().into();
    let after = merge(before.clone(), &new_cluster(), None, true).unwrap();

    assert_eq!(after.clusters["prod"], before.clusters["prod"]);
    assert_eq!(after.users["admin"], before.users["admin"]);
    assert_eq!(after.users["sso"], before.users["sso"]);
    assert_eq!(after.contexts["prod"], before.contexts["prod"]);
    assert_eq!(after.preferences, before.preferences);
    assert_eq!(after.current_context, "test/test");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    after.save(&path).unwrap();
    assert_eq!(KubeConfig::load(&path).unwrap(), after);
}

#[test]
fn exec_plugin_round_trips_through_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");

    merge_file(&path, &new_cluster(), Some("test"), true, None).unwrap();

    let kc = KubeConfig::load(&path).unwrap();
    let UserSpec::Exec { exec } = &kc.users["test"] else {
        panic!("expected an exec user, got {:?}", kc.users["test"]);
    };
    assert!(exec.args.contains(&"--issuer-url=https://auth.example.org".to_owned()));
    assert!(exec.args.contains(&"--client-id=some-client-id".to_owned()));
}

#[test]
fn missing_file_is_an_empty_kubeconfig() {
    let dir = tempfile::tempdir().unwrap();
    let kc = KubeConfig::load(dir.path().join("nope")).unwrap();
    assert!(kc.is_empty());
}

#[test]
fn save_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".kube").join("config");

    merge_file(&path, &new_cluster(), None, false, None).unwrap();
    assert_eq!(KubeConfig::load(&path).unwrap().current_context, "test/test");
}

#[test]
fn malformed_file_is_reported_and_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    fs::write(&path, "clusters: [[[").unwrap();

    let err = merge_file(&path, &new_cluster(), None, false, None).unwrap_err();
    match err {
        Error::MalformedConfig { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("expected MalformedConfig, got {other}"),
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), "clusters: [[[");
}

#[test]
fn failed_merge_does_not_touch_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    fs::write(&path, EXISTING_KUBECONFIG).unwrap();

    let partial = ClusterDescriptor {
        oidc_client_id: None,
        ..new_cluster()
    };
    let err = merge_file(&path, &partial, None, true, None).unwrap_err();
    assert!(matches!(err, Error::OidcIncomplete(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), EXISTING_KUBECONFIG);
}

#[test]
fn organization_is_recorded_on_login() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    fs::write(&path, EXISTING_KUBECONFIG).unwrap();

    let name = merge_file(&path, &new_cluster(), None, true, Some("acme")).unwrap();
    assert_eq!(read_extension(&path, &name).unwrap().organization, "acme");

    let err = read_extension(&path, "existing").unwrap_err();
    assert!(err.is_extension_not_found());
}

#[test]
fn read_extension_reports_malformed_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");
    fs::write(&path, "apiVersion: v9\n").unwrap();

    let err = read_extension(&path, "test").unwrap_err();
    assert!(matches!(err, Error::MalformedConfig { .. }));
}

#[cfg(unix)]
#[test]
fn saving_through_a_symlink_keeps_the_link() {
    let dir = tempfile::tempdir().unwrap();
    let real = dir.path().join("real-config");
    let link = dir.path().join("config");
    fs::write(&real, EXISTING_KUBECONFIG).unwrap();
    std::os::unix::fs::symlink(&real, &link).unwrap();

    merge_file(&link, &new_cluster(), None, false, None).unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert_eq!(KubeConfig::load(&real).unwrap().contexts.len(), 2);
}

#[cfg(unix)]
#[test]
fn saving_through_a_dangling_symlink_creates_its_target() {
    let dir = tempfile::tempdir().unwrap();
    let link = dir.path().join("config");
    std::os::unix::fs::symlink("real-config", &link).unwrap();

    merge_file(&link, &new_cluster(), None, false, None).unwrap();

    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    let real = dir.path().join("real-config");
    assert_eq!(KubeConfig::load(&real).unwrap().current_context, "test/test");
}

#[cfg(unix)]
#[test]
fn failed_save_leaves_the_target_alone() {
    let dir = tempfile::tempdir().unwrap();
    // A non-empty directory can't be renamed over.
    let path = dir.path().join("config");
    fs::create_dir(&path).unwrap();
    fs::write(path.join("keep"), EXISTING_KUBECONFIG).unwrap();

    let kc = merge(KubeConfig::default(), &new_cluster(), None, false).unwrap();
    let err = kc.save(&path).unwrap_err();
    match err {
        Error::Io { path: reported, .. } => assert_eq!(reported, fs::canonicalize(&path).unwrap()),
        other => panic!("expected Io, got {other}"),
    }

    assert_eq!(fs::read_to_string(path.join("keep")).unwrap(), EXISTING_KUBECONFIG);
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, ["config"]);
}

#[test]
fn extension_written_before_login_survives_it() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config");

    let mut kc = KubeConfig::default();
    write_extension(&mut kc, "test/test", "acme");
    kc.save(&path).unwrap();

    merge_file(&path, &new_cluster(), None, true, None).unwrap();

    let kc = KubeConfig::load(&path).unwrap();
    assert_eq!(kc.extension("test/test").unwrap().organization, "acme");
    assert_eq!(kc.context_server("test/test"), Some("https://new.example.org"));
}
