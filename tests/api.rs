use std::sync::Arc;

use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use opensplit::{routes, service::LedgerService, store::MemoryStore};

fn service() -> web::Data<LedgerService> {
    web::Data::new(LedgerService::new(Arc::new(MemoryStore::new())))
}

macro_rules! app {
    ($service:expr) => {
        test::init_service(
            App::new()
                .app_data($service.clone())
                .configure(routes::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn full_group_lifecycle() {
    let service = service();
    let app = app!(service);

    let req = test::TestRequest::put()
        .uri("/groups/flat")
        .set_json(json!({
            "name": "Roommates",
            "category": "home",
            "creator": { "id": "a", "name": "Asha" }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for (id, name) in [("b", "Bilal"), ("c", "Chen")] {
        let req = test::TestRequest::post()
            .uri("/groups/flat/members")
            .set_json(json!({ "id": id, "name": name }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let req = test::TestRequest::post()
        .uri("/groups/flat/expenses")
        .set_json(json!({ "description": "Groceries", "amount": "100.00", "paid_by": "a" }))
        .to_request();
    let applied: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(applied["shares"][0]["amount"], 3334);
    assert_eq!(applied["shares"][1]["amount"], 3333);
    assert_eq!(applied["expense"]["amount"], 10000);
    assert_eq!(applied["expense"]["kind"], "expense");

    let req = test::TestRequest::get().uri("/groups/flat/balance").to_request();
    let summary: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(summary["total_spent"], 10000);
    assert_eq!(summary["members"][0]["receivable"], 6666);
    assert_eq!(summary["members"][2]["owed"], 3333);

    let req = test::TestRequest::get().uri("/groups/flat/settlement").to_request();
    let plan: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        plan,
        json!([
            { "from": "b", "to": "a", "amount": 3333 },
            { "from": "c", "to": "a", "amount": 3333 }
        ])
    );

    let req = test::TestRequest::post()
        .uri("/groups/flat/settlements")
        .set_json(json!({ "from": "b", "to": "a", "amount": 3333 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::delete().uri("/groups/flat/members/b").to_request();
    let group: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(group["members"].as_array().map(Vec::len), Some(2));
    assert_eq!(group["former_members"][0]["id"], "b");

    let req = test::TestRequest::get().uri("/groups/flat/balances").to_request();
    let balances: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(balances, json!([{ "debtor": "c", "creditor": "a", "amount": 3333 }]));

    let req = test::TestRequest::get().uri("/groups/flat/expenses").to_request();
    let expenses: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(expenses.as_array().map(Vec::len), Some(2));
    assert_eq!(expenses[1]["kind"], "settlement");

    let req = test::TestRequest::get().uri("/groups").to_request();
    let groups: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(
        groups,
        json!([{ "id": "flat", "name": "Roommates", "category": "home", "members": 2, "total_spent": 10000 }])
    );
}

#[actix_web::test]
async fn errors_map_to_status_codes() {
    let service = service();
    let app = app!(service);

    let req = test::TestRequest::get().uri("/groups/ghost/balance").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "group_not_found");

    let create = || {
        test::TestRequest::put()
            .uri("/groups/trip")
            .set_json(json!({ "name": "Trip", "creator": { "id": "a", "name": "Asha" } }))
            .to_request()
    };
    assert_eq!(test::call_service(&app, create()).await.status(), StatusCode::CREATED);
    assert_eq!(test::call_service(&app, create()).await.status(), StatusCode::CONFLICT);

    let req = test::TestRequest::post()
        .uri("/groups/trip/expenses")
        .set_json(json!({
            "description": "Taxi",
            "amount": 500,
            "paid_by": "a",
            "participants": [{ "member": "zoe" }]
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unknown_member");

    let req = test::TestRequest::post()
        .uri("/groups/trip/expenses")
        .set_json(json!({ "description": "Taxi", "amount": -5, "paid_by": "a" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::post()
        .uri("/groups/trip/expenses")
        .set_json(json!({ "description": "Taxi", "amount": "1.005", "paid_by": "a" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::delete().uri("/groups/trip/members/a").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "last_member");
}
