#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

fn compile_input() -> Value {
    json!({
        "raw_query": "filter=status==active&sort=-id&page[size]=10&page[number]=2",
        "policy": {
            "version": "v3",
            "fields": {
                "status": {
                    "type": "enum",
                    "filterable": true,
                    "operators": ["==", "!="],
                    "enum_values": ["active", "disabled"]
                }
            },
            "query_dimensions": {
                "sortable_fields": ["id"],
                "fields_allowlist": { "users": ["id", "status"] }
            }
        },
        "context": {
            "tenant_context_present": true,
            "security_predicate": {
                "field": "tenant_id",
                "operator": "==",
                "bound_parameter_key": "tenant_scope"
            }
        }
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec_pretty(value).expect("json")).expect("write");
    path
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("valid json")
}

fn assert_stderr_contains(stderr: &[u8], needle: &str) {
    let text = String::from_utf8_lossy(stderr);
    assert!(text.contains(needle), "missing {needle:?} in {text}");
}

fn setup() -> (TempDir, PathBuf) {
    let dir = tempdir().expect("tempdir");
    let input = write_json(dir.path(), "input.json", &compile_input());
    (dir, input)
}

#[test]
fn compile_query_uses_default_config() {
    let dir = tempdir().expect("tempdir");
    let output = cargo_bin_cmd!("jsonapi-rsql")
        .env_remove("JSONAPI_RSQL_CONFIG")
        .current_dir(dir.path())
        .args(["compile", "--query", "page[size]=5"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["ok"], json!(true));
    assert_eq!(json["plan"]["policy_version"], json!("v0"));
    assert_eq!(json["plan"]["page"]["size"], json!(5));
}

#[test]
fn compile_input_writes_out_file() {
    let (dir, input) = setup();
    let out = dir.path().join("nested").join("plan.json");
    cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let json: Value = serde_json::from_slice(&fs::read(&out).expect("out file")).expect("json");
    assert_eq!(json["ok"], json!(true));
    assert_eq!(json["plan"]["policy_version"], json!("v3"));
    assert_eq!(json["plan"]["filter"]["expression"], json!("status==active"));
    assert_eq!(json["plan"]["sort"], json!(["-id"]));
}

#[test]
fn compile_rejection_is_reported_in_envelope() {
    let dir = tempdir().expect("tempdir");
    let mut input = compile_input();
    input["raw_query"] = json!("filter=ghost==1");
    let input = write_json(dir.path(), "input.json", &input);
    let output = cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["ok"], json!(false));
    assert_eq!(json["errors"][0]["code"], json!("unknown_field"));
    assert!(json.get("plan").is_none());
}

#[test]
fn compile_requires_exactly_one_source() {
    let (dir, input) = setup();
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .current_dir(dir.path())
        .arg("compile")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "error: exactly one of --in or --query");
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .current_dir(dir.path())
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .args(["--query", "sort=id"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "error: exactly one of --in or --query");
}

#[test]
fn compile_missing_input_fails() {
    let dir = tempdir().expect("tempdir");
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "compile input does not exist");
}

#[test]
fn explicit_config_must_exist() {
    let dir = tempdir().expect("tempdir");
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .current_dir(dir.path())
        .args(["compile", "--query", "sort=id", "--config"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "config file does not exist");
}

#[test]
fn project_config_in_working_directory_is_used() {
    let dir = tempdir().expect("tempdir");
    write_json(
        dir.path(),
        "project.config.json",
        &json!({
            "policy": {
                "version": "v9",
                "query_dimensions": { "sortable_fields": ["name"] }
            },
            "context": {
                "tenant_context_present": true,
                "security_predicate": { "field": "org_id", "operator": "==" }
            }
        }),
    );
    let output = cargo_bin_cmd!("jsonapi-rsql")
        .env_remove("JSONAPI_RSQL_CONFIG")
        .current_dir(dir.path())
        .args(["compile", "--query", "sort=-name"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["ok"], json!(true));
    assert_eq!(json["plan"]["policy_version"], json!("v9"));
    assert_eq!(json["plan"]["sort"], json!(["-name"]));
    assert_eq!(json["plan"]["security"]["predicate"]["field"], json!("org_id"));
}

#[test]
fn toml_config_is_accepted() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("rsql.toml");
    fs::write(
        &config,
        r#"
[policy]
version = "v7"

[context]
tenant_context_present = true

[context.security_predicate]
field = "account_id"
operator = "=="
"#,
    )
    .expect("write");
    let output = cargo_bin_cmd!("jsonapi-rsql")
        .args(["compile", "--query", ""])
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    assert_eq!(json["plan"]["policy_version"], json!("v7"));
    assert_eq!(
        json["plan"]["security"]["predicate"]["field"],
        json!("account_id")
    );
}

#[test]
fn validate_plan_accepts_compile_output() {
    let (dir, input) = setup();
    let out = dir.path().join("plan.json");
    cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    cargo_bin_cmd!("jsonapi-rsql")
        .arg("validate-plan")
        .arg("--in")
        .arg(&out)
        .assert()
        .success()
        .stdout("ok\n");

    // A bare plan works as well as the envelope.
    let envelope: Value = serde_json::from_slice(&fs::read(&out).expect("read")).expect("json");
    let bare = write_json(dir.path(), "bare.json", &envelope["plan"]);
    cargo_bin_cmd!("jsonapi-rsql")
        .arg("validate-plan")
        .arg("--in")
        .arg(&bare)
        .assert()
        .success()
        .stdout("ok\n");
}

#[test]
fn validate_plan_rejects_bad_documents() {
    let dir = tempdir().expect("tempdir");
    let bad = write_json(dir.path(), "bad.json", &json!({ "kind": "query_plan" }));
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .arg("validate-plan")
        .arg("--in")
        .arg(&bad)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "error: ");

    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .arg("validate-plan")
        .arg("--in")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "plan input does not exist");
}

#[test]
fn sql_compiles_plan_and_mapping() {
    let (dir, input) = setup();
    let plan = dir.path().join("plan.json");
    cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .arg("--out")
        .arg(&plan)
        .assert()
        .success();
    let mapping = write_json(
        dir.path(),
        "mapping.json",
        &json!({
            "resource": { "table": "users", "type": "users" },
            "fields": {
                "id": { "kind": "column", "column": "id" },
                "status": { "kind": "column", "column": "status" },
                "tenant_id": { "kind": "column", "column": "tenant_id" }
            },
            "default_select": ["id", "status"]
        }),
    );
    let security = write_json(
        dir.path(),
        "security.json",
        &json!({ "tenant_scope": "tenant-a" }),
    );

    let output = cargo_bin_cmd!("jsonapi-rsql")
        .arg("sql")
        .arg("--plan")
        .arg(&plan)
        .arg("--mapping")
        .arg(&mapping)
        .arg("--security-context")
        .arg(&security)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json = stdout_json(&output);
    let text = json["text"].as_str().expect("text");
    assert!(text.starts_with("SELECT "), "{text}");
    assert!(text.contains("FROM \"users\""), "{text}");
    assert!(text.contains("LIMIT $3 OFFSET $4"), "{text}");
    assert_eq!(json["values"], json!(["active", "tenant-a", 10, 10]));
}

#[test]
fn sql_without_security_binding_fails() {
    let (dir, input) = setup();
    let plan = dir.path().join("plan.json");
    cargo_bin_cmd!("jsonapi-rsql")
        .arg("compile")
        .arg("--in")
        .arg(&input)
        .arg("--out")
        .arg(&plan)
        .assert()
        .success();
    let mapping = write_json(
        dir.path(),
        "mapping.json",
        &json!({
            "resource": { "table": "users", "type": "users" },
            "fields": {
                "id": { "kind": "column", "column": "id" },
                "status": { "kind": "column", "column": "status" },
                "tenant_id": { "kind": "column", "column": "tenant_id" }
            }
        }),
    );
    let stderr = cargo_bin_cmd!("jsonapi-rsql")
        .arg("sql")
        .arg("--plan")
        .arg(&plan)
        .arg("--mapping")
        .arg(&mapping)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert_stderr_contains(&stderr, "error: ");
}
