#![allow(missing_docs)]

use jsonapi_rsql::{compile_request, compile_request_safe, CompileInput, SafeOutcome};
use serde_json::{json, Value};

fn base_policy() -> Value {
    json!({
        "version": "v1",
        "fields": {
            "id": { "type": "int", "filterable": true, "operators": ["==", "!=", "=in=", "=out="] },
            "score": { "type": "float", "filterable": true, "operators": ["==", ">=", "<="] },
            "enabled": { "type": "bool", "filterable": true, "operators": ["==", "!="] },
            "created": { "type": "date", "filterable": true, "operators": ["==", ">=", "<="] },
            "seen_at": { "type": "datetime", "filterable": true, "operators": ["==", ">=", "<="] },
            "uid": { "type": "uuid", "filterable": true, "operators": ["==", "!="] },
            "name": { "type": "string", "filterable": true, "operators": ["==", "!="] },
            "status": {
                "type": "enum",
                "filterable": true,
                "operators": ["==", "!=", "=in=", "=out="],
                "enum_values": ["active", "disabled"]
            }
        },
        "query_dimensions": {
            "include_allowlist": ["groups"],
            "sortable_fields": ["created", "status", "id"],
            "fields_allowlist": { "users": ["id", "status", "created"] }
        },
        "limits": {
            "max_raw_query_length": 4096,
            "max_decoded_query_length": 4096,
            "max_include_paths": 10,
            "max_sort_keys": 8,
            "max_sparse_fields": 25,
            "max_ast_depth": 8,
            "max_ast_nodes": 64,
            "max_in_list_items": 50
        }
    })
}

fn tenant_context() -> Value {
    json!({
        "tenant_context_present": true,
        "security_predicate": {
            "field": "tenant_id",
            "operator": "==",
            "bound_parameter_key": "tenant_scope"
        }
    })
}

fn input_with(raw_query: &str, policy: Value) -> CompileInput {
    CompileInput::from_json(&json!({
        "raw_query": raw_query,
        "policy": policy,
        "context": tenant_context()
    }))
    .expect("compile input")
}

fn input(raw_query: &str) -> CompileInput {
    input_with(raw_query, base_policy())
}

fn wildcard_policy() -> Value {
    let mut policy = base_policy();
    policy["fields"] = json!({
        "name": {
            "type": "string",
            "filterable": true,
            "operators": ["==", "!="],
            "wildcard": {
                "enabled": true,
                "modes": ["contains", "starts_with", "ends_with"],
                "case_sensitive": true,
                "min_value_length": 1,
                "max_value_length": 64
            }
        }
    });
    policy
}

fn error_code(outcome: &SafeOutcome) -> &str {
    assert!(!outcome.ok, "expected failure, got {outcome:?}");
    outcome.errors[0].code.as_str()
}

fn first_clause(raw_query: &str) -> Value {
    let plan = compile_request(&input(raw_query)).expect("plan");
    serde_json::to_value(&plan.filter.clauses[0]).expect("clause json")
}

#[test]
fn basic_filter_and_sort_compile() {
    let outcome = compile_request_safe(&input("filter=status==active&sort=-id"));
    assert!(outcome.ok);
    let plan = serde_json::to_value(outcome.plan.expect("plan")).expect("plan json");
    assert_eq!(plan["kind"], json!("query_plan"));
    assert_eq!(plan["filter"]["dialect"], json!("rsql-fiql"));
    assert_eq!(plan["filter"]["expression"], json!("status==active"));
    let clause = &plan["filter"]["clauses"][0];
    assert_eq!(clause["field"], json!("status"));
    assert_eq!(clause["operator"], json!("=="));
    assert_eq!(clause["values"], json!(["active"]));
    assert_eq!(plan["sort"], json!(["-id"]));
    assert_eq!(plan["bindings"][0]["key"], json!("p1"));
    assert_eq!(plan["meta"]["normalized"], json!(true));
    assert_eq!(plan["meta"]["policy_version"], json!("v1"));
    assert_eq!(
        plan["security"]["predicate"],
        json!({ "field": "tenant_id", "operator": "==", "bound_parameter_key": "tenant_scope" })
    );
}

#[test]
fn compilation_is_deterministic() {
    let raw = "filter=status==active;id=in=(3,1,2)&include=groups&sort=-created,status&page[size]=10";
    let a = serde_json::to_string(&compile_request(&input(raw)).expect("a")).expect("json a");
    let b = serde_json::to_string(&compile_request(&input(raw)).expect("b")).expect("json b");
    assert_eq!(a, b);
}

#[test]
fn strict_numeric_parsing() {
    for raw in ["filter=id==1e3", "filter=id==01", "filter=id==1.0", "filter=score==1e-3", "filter=score==.5"] {
        let outcome = compile_request_safe(&input(raw));
        assert_eq!(error_code(&outcome), "value_type_mismatch", "{raw}");
    }
    assert_eq!(first_clause("filter=id==-42")["values"], json!(["-42"]));
    assert_eq!(first_clause("filter=score>=2.50")["values"], json!(["2.50"]));
    assert_eq!(
        first_clause("filter=score==9007199254740993.000000000000000001")["values"],
        json!(["9007199254740993.000000000000000001"])
    );
}

#[test]
fn bool_parsing_is_lowercase_only() {
    assert!(compile_request_safe(&input("filter=enabled==true")).ok);
    let bad = compile_request_safe(&input("filter=enabled==TRUE"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
    assert_eq!(first_clause("filter=enabled!=false")["values"], json!([false]));
}

#[test]
fn date_and_uuid_parsing() {
    let bad = compile_request_safe(&input("filter=created==02/19/2026"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
    let bad = compile_request_safe(&input("filter=created==2026-02-30"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
    assert_eq!(
        first_clause("filter=created>=2026-02-19")["values"],
        json!(["2026-02-19"])
    );

    let clause = first_clause("filter=uid==3F2504E0-4F89-41D3-9A0C-0305E82C3301");
    assert_eq!(
        clause["values"],
        json!(["3f2504e0-4f89-41d3-9a0c-0305e82c3301"])
    );
    let bad = compile_request_safe(&input("filter=uid==not-a-uuid"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
}

#[test]
fn datetime_offsets_normalize_to_utc() {
    let clause = first_clause("filter=seen_at==2026-02-19T10:00:00%2B02:00");
    assert_eq!(clause["values"], json!(["2026-02-19T08:00:00.000Z"]));
    assert_eq!(clause["normalized_from_timezone"], json!(true));

    let clause = first_clause("filter=seen_at==2026-02-19T10:00:00.5Z");
    assert_eq!(clause["values"], json!(["2026-02-19T10:00:00.500Z"]));
    assert_eq!(clause["normalized_from_timezone"], json!(false));

    let bad = compile_request_safe(&input("filter=seen_at==2026-02-19T10:00:00"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
    let bad = compile_request_safe(&input("filter=seen_at==2026-12-31T23:59:60Z"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
}

#[test]
fn datetime_from_pre_parsed_query_keeps_plus_sign() {
    let input = CompileInput::from_json(&json!({
        "query": { "filter": "seen_at==2026-02-19T00:30:00+01:00" },
        "policy": base_policy(),
        "context": tenant_context()
    }))
    .expect("input");
    let plan = compile_request(&input).expect("plan");
    let clause = serde_json::to_value(&plan.filter.clauses[0]).expect("clause");
    assert_eq!(clause["values"], json!(["2026-02-18T23:30:00.000Z"]));
}

#[test]
fn enum_matching_is_case_sensitive() {
    let outcome = compile_request_safe(&input("filter=status==Active"));
    assert_eq!(error_code(&outcome), "value_type_mismatch");
}

#[test]
fn null_only_with_equality_operators() {
    assert!(compile_request_safe(&input("filter=status==null")).ok);
    assert_eq!(first_clause("filter=status!=null")["values"], json!([null]));
    let bad = compile_request_safe(&input("filter=created>=null"));
    assert_eq!(error_code(&bad), "value_type_mismatch");
    // Quoted null is a plain string.
    assert_eq!(first_clause("filter=name=='null'")["values"], json!(["null"]));
}

#[test]
fn field_and_operator_checks() {
    let outcome = compile_request_safe(&input("filter=ghost==1"));
    assert_eq!(error_code(&outcome), "unknown_field");
    let outcome = compile_request_safe(&input("filter=score!=1"));
    assert_eq!(error_code(&outcome), "operator_not_allowed");

    let mut policy = base_policy();
    policy["fields"]["name"]["filterable"] = json!(false);
    let outcome = compile_request_safe(&input_with("filter=name==x", policy));
    assert_eq!(error_code(&outcome), "field_not_allowed");
}

#[test]
fn filter_syntax_errors() {
    for raw in [
        "filter=status",
        "filter=status==",
        "filter=(status==active",
        "filter=status==active;",
        "filter=status=like=x",
    ] {
        let outcome = compile_request_safe(&input(raw));
        assert_eq!(error_code(&outcome), "invalid_filter_syntax", "{raw}");
    }
    let outcome = compile_request_safe(&input("filter=groups.name==admins"));
    assert_eq!(error_code(&outcome), "invalid_filter_syntax");
}

#[test]
fn empty_membership_list_is_rejected() {
    let outcome = compile_request_safe(&input("filter=id=in=()"));
    assert_eq!(error_code(&outcome), "empty_in_list_not_allowed");
    let outcome = compile_request_safe(&input("filter=status=out=()"));
    assert_eq!(error_code(&outcome), "empty_in_list_not_allowed");
}

#[test]
fn allowlists_are_enforced() {
    let outcome = compile_request_safe(&input("filter=status==active&include=memberships"));
    assert_eq!(error_code(&outcome), "include_not_allowed");
    assert_eq!(
        outcome.errors[0].source.as_ref().map(|s| s.parameter.as_str()),
        Some("include")
    );

    let outcome = compile_request_safe(&input("filter=status==active&sort=-uid"));
    assert_eq!(error_code(&outcome), "sort_not_allowed");

    let outcome = compile_request_safe(&input("filter=status==active&fields[users]=id,secret"));
    assert_eq!(error_code(&outcome), "fields_not_allowed");
    assert_eq!(
        outcome.errors[0].source.as_ref().map(|s| s.parameter.as_str()),
        Some("fields[users]")
    );

    let outcome = compile_request_safe(&input("fields[groups]=id"));
    assert_eq!(error_code(&outcome), "fields_not_allowed");
}

#[test]
fn wildcards_are_opt_in() {
    let outcome = compile_request_safe(&input("filter=name==act*"));
    assert_eq!(error_code(&outcome), "wildcard_not_allowed");
    let outcome = compile_request_safe(&input("filter=name!=act*"));
    assert_eq!(error_code(&outcome), "wildcard_operator_not_allowed");
    let outcome = compile_request_safe(&input("filter=status==act*"));
    assert_eq!(error_code(&outcome), "wildcard_type_not_supported");
}

#[test]
fn wildcard_modes_resolve() {
    let outcome = compile_request_safe(&input_with("filter=name==*anna*", wildcard_policy()));
    let plan = serde_json::to_value(outcome.plan.expect("plan")).expect("json");
    let clause = &plan["filter"]["clauses"][0];
    assert_eq!(
        clause["wildcard"],
        json!({ "mode": "contains", "value": "anna", "case_sensitive": true })
    );
    assert_eq!(clause["values"], json!(["anna"]));

    for (raw, mode) in [("filter=name==anna*", "starts_with"), ("filter=name==*anna", "ends_with")] {
        let outcome = compile_request_safe(&input_with(raw, wildcard_policy()));
        let plan = serde_json::to_value(outcome.plan.expect("plan")).expect("json");
        assert_eq!(plan["filter"]["clauses"][0]["wildcard"]["mode"], json!(mode));
    }

    for raw in ["filter=name==a*b", "filter=name==**", "filter=name==*"] {
        let outcome = compile_request_safe(&input_with(raw, wildcard_policy()));
        assert_eq!(error_code(&outcome), "invalid_wildcard_pattern", "{raw}");
    }

    let quoted = compile_request_safe(&input_with("filter=name=='an*'", wildcard_policy()));
    let plan = serde_json::to_value(quoted.plan.expect("plan")).expect("json");
    assert!(plan["filter"]["clauses"][0].get("wildcard").map_or(true, Value::is_null));
    assert_eq!(plan["filter"]["clauses"][0]["values"], json!(["an*"]));
}

#[test]
fn wildcard_modes_and_lengths_are_policy_bound() {
    let mut policy = wildcard_policy();
    policy["fields"]["name"]["wildcard"]["modes"] = json!(["starts_with"]);
    policy["fields"]["name"]["wildcard"]["max_value_length"] = json!(3);
    let outcome = compile_request_safe(&input_with("filter=name==*ann", policy.clone()));
    assert_eq!(error_code(&outcome), "wildcard_not_allowed");
    let outcome = compile_request_safe(&input_with("filter=name==anna*", policy.clone()));
    assert_eq!(error_code(&outcome), "invalid_wildcard_pattern");
    assert!(compile_request_safe(&input_with("filter=name==ann*", policy)).ok);
}

#[test]
fn like_metacharacters_stay_literal() {
    let mut policy = wildcard_policy();
    policy["fields"]["name"]["wildcard"]["modes"] = json!(["starts_with"]);
    policy["fields"]["name"]["wildcard"]["min_value_length"] = json!(3);
    for (raw, literal) in [
        ("filter=name==%25ab*", "%ab"),
        ("filter=name==%25%25%25*", "%%%"),
        ("filter=name==___*", "___"),
        ("filter=name==a%5Cb*", r"a\b"),
    ] {
        let plan = compile_request(&input_with(raw, policy.clone())).expect("plan");
        let clause = serde_json::to_value(&plan.filter.clauses[0]).expect("clause json");
        assert_eq!(clause["wildcard"]["mode"], json!("starts_with"), "{raw}");
        assert_eq!(clause["wildcard"]["value"], json!(literal), "{raw}");
    }

    // Only `*` selects the mode; `%` counts as one plain character.
    let outcome = compile_request_safe(&input_with("filter=name==*ab%25", policy.clone()));
    assert_eq!(error_code(&outcome), "wildcard_not_allowed");
    let outcome = compile_request_safe(&input_with("filter=name==%25a*", policy));
    assert_eq!(error_code(&outcome), "invalid_wildcard_pattern");
}

#[test]
fn dot_in_string_literal_is_allowed() {
    assert!(compile_request_safe(&input("filter=name==foo.bar")).ok);
}

#[test]
fn disjunction_flattens_into_clause_list() {
    let plan = compile_request(&input("filter=status==active,status==disabled")).expect("plan");
    assert_eq!(plan.filter.clauses.len(), 2);
    assert_eq!(plan.bindings.len(), 2);
}

#[test]
fn page_parameters() {
    let mut policy = base_policy();
    policy["limits"]["max_page_size"] = json!(50);
    policy["limits"]["max_page_number"] = json!(1000);

    let outcome = compile_request_safe(&input_with(
        "filter=status==active&page[size]=25&page[number]=3",
        policy.clone(),
    ));
    let plan = outcome.plan.expect("plan");
    assert_eq!(plan.page.size, Some(25));
    assert_eq!(plan.page.number, Some(3));

    for raw in [
        "page[size]=51",
        "page[number]=1001",
        "page[size]=0",
        "page[size]=-1",
        "page[size]=1.5",
        "page[size]=abc",
        "page[offset]=10",
    ] {
        let outcome = compile_request_safe(&input_with(raw, policy.clone()));
        assert_eq!(error_code(&outcome), "page_parameter_invalid", "{raw}");
    }
}

#[test]
fn duplicate_parameters_are_rejected() {
    let outcome = compile_request_safe(&input("sort=id&sort=-id"));
    assert_eq!(error_code(&outcome), "invalid_query_string");
    let meta = outcome.errors[0].meta.as_ref().expect("meta");
    assert_eq!(meta.get("duplicate_parameter"), Some(&json!("sort")));
}

#[test]
fn unknown_parameters_pass_through() {
    let plan = compile_request(&input("filter=status==active&utm_source=mail")).expect("plan");
    let normalized = serde_json::to_value(&plan.normalized_query).expect("json");
    assert_eq!(normalized["utm_source"], json!("mail"));
}

#[test]
fn malformed_input_document_is_internal_error() {
    let outcome = jsonapi_rsql::compile_json_safe(&json!({ "raw_query": 5 }));
    assert_eq!(error_code(&outcome), "internal_error");
    assert_eq!(outcome.errors[0].status, "500");
}
