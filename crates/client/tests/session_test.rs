#![allow(clippy::unwrap_used, clippy::expect_used)]
//! FindSession integration tests: find, delete, and their reply contracts.

use std::sync::Arc;

use serde_json::json;

use sbx_client::{
    DELETE_PATH, FALLBACK_ERROR, FIND_PATH, FetchPath, FetchSpec, LoadAllSettings, Outcome,
    SbxClient, Sort,
};
use sbx_test_utils::{
    ScriptedTransport, assert, failure_body, page_body, page_body_with_fetched, records,
};

fn client(transport: &Arc<ScriptedTransport>) -> SbxClient {
    SbxClient::with_transport(96, transport.clone(), LoadAllSettings::default())
}

// -------------------------------------------------------------------------
// find
// -------------------------------------------------------------------------

#[tokio::test]
async fn find_posts_compiled_query_once() {
    let transport = Arc::new(ScriptedTransport::new().page(3, page_body(records(3, 2), 5)));
    let mut session = client(&transport).with("Order");
    session
        .query()
        .set_page(3)
        .set_page_size(2)
        .and_where_is_greater_than("total", 10)
        .order_by("created", Sort::Desc);

    let outcome = session.find(&FetchSpec::new()).await.unwrap();

    let page = outcome.success().unwrap();
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.total_pages, 5);

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, FIND_PATH);
    assert::json_eq(
        &calls[0].body,
        &json!({
            "domain": 96,
            "row_model": "Order",
            "page": 3,
            "size": 2,
            "where": [{"ANDOR": "AND", "GROUP": [
                {"ANDOR": "AND", "FIELD": "total", "OP": ">", "VAL": 10}
            ]}],
            "order_by": {"ASC": false, "FIELD": "created"}
        }),
    );
}

#[tokio::test]
async fn find_failure_resolves_to_value() {
    let transport = Arc::new(ScriptedTransport::new().page(1, failure_body("bad query")));

    let outcome = client(&transport).with("Order").find(&FetchSpec::new()).await.unwrap();

    assert_eq!(outcome.failure().unwrap().error, "bad query");
    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({"success": false, "error": "bad query"})
    );
}

#[tokio::test]
async fn find_failure_with_error_field() {
    let transport =
        Arc::new(ScriptedTransport::new().page(1, json!({"success": false, "error": "denied"})));

    let outcome = client(&transport).with("Order").find(&FetchSpec::new()).await.unwrap();

    assert_eq!(outcome.failure().unwrap().error, "denied");
}

#[tokio::test]
async fn find_failure_without_message_uses_fallback() {
    let transport = Arc::new(ScriptedTransport::new().page(1, json!({"success": false})));

    let outcome = client(&transport).with("Order").find(&FetchSpec::new()).await.unwrap();

    assert_eq!(outcome.failure().unwrap().error, FALLBACK_ERROR);
}

#[tokio::test]
async fn find_transport_failure_is_an_error() {
    let transport = Arc::new(ScriptedTransport::new().page_error(1, "connection refused"));

    let err = client(&transport).with("Order").find(&FetchSpec::new()).await.unwrap_err();

    assert::contains(&err.to_string(), "connection refused");
    assert_eq!(err.failed_page(), None);
}

#[tokio::test]
async fn find_maps_fetched_references() {
    let transport = Arc::new(ScriptedTransport::new().page(
        1,
        page_body_with_fetched(
            vec![json!({"id": 1, "owner": "u42"}), json!({"id": 2, "owner": "u7"})],
            1,
            json!({"User": {"u42": {"id": "u42", "name": "Ann"}}}),
        ),
    ));
    let to_fetch: FetchSpec = [FetchPath::parse("owner").in_model("User")].into_iter().collect();

    let outcome = client(&transport).with("Order").find(&to_fetch).await.unwrap();
    let page = outcome.success().unwrap();

    assert::json_eq(&page.results[0], &json!({"id": 1, "owner": {"id": "u42", "name": "Ann"}}));
    assert_eq!(page.results[1]["owner"], "u7");
    assert!(page.fetched_results.as_ref().unwrap().contains_key("User"));
}

#[tokio::test]
async fn find_without_side_table_leaves_records() {
    let transport = Arc::new(
        ScriptedTransport::new().page(1, page_body(vec![json!({"id": 1, "owner": "u42"})], 1)),
    );
    let to_fetch: FetchSpec = ["owner"].into_iter().collect();

    let outcome = client(&transport).with("Order").find(&to_fetch).await.unwrap();

    assert_eq!(outcome.success().unwrap().results[0]["owner"], "u42");
}

#[tokio::test]
async fn find_tolerates_null_total_pages_and_empty_side_table() {
    let transport = Arc::new(ScriptedTransport::new().page(
        1,
        json!({"success": true, "results": [{"owner": "u1"}], "total_pages": null, "fetched_results": []}),
    ));
    let to_fetch: FetchSpec = ["owner"].into_iter().collect();

    let outcome = client(&transport).with("Order").find(&to_fetch).await.unwrap();
    let page = outcome.success().unwrap();

    assert_eq!(page.total_pages, 1);
    assert_eq!(page.results[0]["owner"], "u1");
}

#[tokio::test]
async fn find_keeps_extra_reply_fields() {
    let transport = Arc::new(ScriptedTransport::new().page(
        1,
        json!({"success": true, "results": [], "total_pages": 1, "row_count": 0}),
    ));

    let outcome = client(&transport).with("Order").find(&FetchSpec::new()).await.unwrap();

    let Outcome::Success(page) = outcome else {
        panic!("find should succeed");
    };
    assert_eq!(page.extra["row_count"], 0);
}

// -------------------------------------------------------------------------
// delete
// -------------------------------------------------------------------------

#[tokio::test]
async fn delete_posts_to_delete_endpoint() {
    let transport = Arc::new(
        ScriptedTransport::new().reply(DELETE_PATH, json!({"success": true, "row_count": 2})),
    );
    let mut session = client(&transport).with("Order");
    session.query().where_with_keys(["k1", "k2"]);

    let outcome = session.delete().await.unwrap();

    assert_eq!(outcome.success().unwrap()["row_count"], 2);
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].path, DELETE_PATH);
    assert_eq!(calls[0].body["keys"], json!(["k1", "k2"]));
}

#[tokio::test]
async fn delete_failure_resolves_to_value() {
    let transport =
        Arc::new(ScriptedTransport::new().reply(DELETE_PATH, failure_body("row is locked")));

    let outcome = client(&transport).with("Order").delete().await.unwrap();

    assert_eq!(outcome.failure().unwrap().error, "row is locked");
}

#[tokio::test]
async fn session_is_reusable_across_operations() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .page(1, page_body(records(1, 1), 1))
            .reply(DELETE_PATH, json!({"success": true})),
    );
    let session = client(&transport).with("Order");

    assert!(session.find(&FetchSpec::new()).await.unwrap().is_success());
    assert!(session.delete().await.unwrap().is_success());
    assert!(session.load_all(&FetchSpec::new()).await.unwrap().is_success());

    let paths: Vec<String> = transport.calls().into_iter().map(|c| c.path).collect();
    assert_eq!(paths, vec![FIND_PATH, DELETE_PATH, FIND_PATH]);
}
