#![allow(missing_docs)]

use jsonapi_rsql::query::{context_fingerprint, plan_cache_key, CompileContext};
use jsonapi_rsql::{compile_request, CompileInput, QueryPlan};
use proptest::prelude::*;
use serde_json::{json, Value};

fn policy(version: &str) -> Value {
    json!({
        "version": version,
        "fields": {
            "id": { "type": "int", "filterable": true, "operators": ["==", "=in="] },
            "status": {
                "type": "enum",
                "filterable": true,
                "operators": ["==", "!="],
                "enum_values": ["active", "disabled"]
            }
        },
        "query_dimensions": {
            "include_allowlist": ["groups", "memberships", "owner"],
            "sortable_fields": ["status", "id"],
            "fields_allowlist": { "users": ["id", "status", "name"] }
        }
    })
}

fn context(auth_hash: &str) -> Value {
    json!({
        "tenant_context_present": true,
        "auth_context_hash": auth_hash,
        "security_predicate": {
            "field": "tenant_id",
            "operator": "==",
            "bound_parameter_key": "tenant_scope"
        }
    })
}

fn compile(raw_query: &str, version: &str, auth_hash: &str) -> QueryPlan {
    let input = CompileInput::from_json(&json!({
        "raw_query": raw_query,
        "policy": policy(version),
        "context": context(auth_hash)
    }))
    .expect("input");
    compile_request(&input).expect("plan")
}

#[test]
fn context_fingerprint_changes_cache_key() {
    let a = compile("filter=status==active&sort=-status", "v1", "role:admin");
    let b = compile("filter=status==active&sort=-status", "v1", "role:viewer");
    assert_ne!(a.meta.context_fingerprint, b.meta.context_fingerprint);
    assert_ne!(a.meta.plan_cache_key, b.meta.plan_cache_key);
    assert_eq!(a.meta.normalized_query_key, b.meta.normalized_query_key);
}

#[test]
fn policy_version_changes_cache_key() {
    let a = compile("filter=status==active", "v1", "role:admin");
    let b = compile("filter=status==active", "v2", "role:admin");
    assert_ne!(a.meta.plan_cache_key, b.meta.plan_cache_key);
    assert_eq!(a.meta.context_fingerprint, b.meta.context_fingerprint);
}

#[test]
fn cache_key_is_a_json_tuple() {
    let plan = compile("filter=status==active", "v1", "role:admin|trace:sample");
    let key: Value = serde_json::from_str(&plan.meta.plan_cache_key).expect("json tuple");
    let parts = key.as_array().expect("array");
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], json!("v1"));
    assert_eq!(parts[1], json!(plan.meta.context_fingerprint));
    assert_eq!(parts[2], json!(plan.meta.normalized_query_key));
    assert_eq!(
        plan.meta.plan_cache_key,
        plan_cache_key("v1", &plan.meta.context_fingerprint, &plan.meta.normalized_query_key)
    );
}

#[test]
fn delimiters_in_components_cannot_collide() {
    let a = plan_cache_key("v1|x", "fp", "{}");
    let b = plan_cache_key("v1", "x|fp", "{}");
    assert_ne!(a, b);
}

#[test]
fn fingerprint_ignores_tenant_values() {
    let plain: CompileContext = serde_json::from_value(context("h")).expect("context");
    let mut extended = context("h");
    extended["tenant_scope"] = json!("tenant-a");
    extended["security_predicate"]["value"] = json!("tenant-a");
    let extended: CompileContext = serde_json::from_value(extended).expect("context");
    assert_eq!(context_fingerprint(&plain), context_fingerprint(&extended));
}

#[test]
fn normalized_key_is_canonical_json() {
    let plan = compile(
        "sort=-status&include=owner,groups&filter=status==active",
        "v1",
        "h",
    );
    assert_eq!(
        plan.meta.normalized_query_key,
        r#"{"filter":"status==active","include":["groups","owner"],"sort":["-status"]}"#
    );
}

#[test]
fn sort_order_is_part_of_the_key() {
    let a = compile("sort=-status,id", "v1", "h");
    let b = compile("sort=id,-status", "v1", "h");
    assert_ne!(a.meta.normalized_query_key, b.meta.normalized_query_key);
    assert_eq!(a.sort, vec!["-status".to_string(), "id".to_string()]);
}

#[test]
fn equivalent_orderings_share_keys() {
    let a = compile(
        "filter=status==active&include=groups,memberships&sort=-status,id",
        "v1",
        "h",
    );
    let b = compile(
        "sort=-status,id&include=memberships,groups&filter=status==active",
        "v1",
        "h",
    );
    assert_eq!(a.meta.normalized_query_key, b.meta.normalized_query_key);
    assert_eq!(a.meta.plan_cache_key, b.meta.plan_cache_key);
}

fn shuffled<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    let mut keyed: Vec<(usize, T)> = order.iter().copied().zip(items.iter().cloned()).collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, item)| item).collect()
}

proptest! {
    #[test]
    fn normalization_is_order_invariant(
        include_order in proptest::collection::vec(0usize..100, 3),
        fields_order in proptest::collection::vec(0usize..100, 3),
        param_order in proptest::collection::vec(0usize..100, 4),
    ) {
        let include = shuffled(&["groups", "memberships", "owner"], &include_order).join(",");
        let fields = shuffled(&["id", "name", "status"], &fields_order).join(",");
        let canonical = [
            "filter=status==active".to_string(),
            "include=groups,memberships,owner".to_string(),
            "fields[users]=id,name,status".to_string(),
            "sort=-status,id".to_string(),
        ]
        .join("&");
        let params = [
            "filter=status==active".to_string(),
            format!("include={include}"),
            format!("fields[users]={fields}"),
            "sort=-status,id".to_string(),
        ];
        let permuted = shuffled(&params, &param_order).join("&");

        let a = compile(&canonical, "v1", "h");
        let b = compile(&permuted, "v1", "h");
        prop_assert_eq!(&a.meta.normalized_query_key, &b.meta.normalized_query_key);
        prop_assert_eq!(&a.meta.plan_cache_key, &b.meta.plan_cache_key);
        prop_assert_eq!(
            serde_json::to_string(&a).expect("json a"),
            serde_json::to_string(&b).expect("json b")
        );
    }
}
