mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{token, Fixture};
use inventory_engine::routes::build_router;

async fn call(app: &Router, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn app(f: &Fixture) -> Router {
    build_router(f.state.clone())
}

async fn stock(app: &Router, f: &Fixture, product: Uuid, warehouse: Uuid, quantity: i32) {
    let body = json!({ "productId": product, "warehouseId": warehouse, "quantity": quantity });
    let (status, _) = call(app, Method::PUT, "/api/stock-levels", Some(f.user), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_is_public_and_everything_else_needs_a_token() {
    let f = Fixture::new();
    let app = app(&f);

    let (status, _) = call(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::GET, "/api/sales", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    // token válido, mas sem perfil
    let (status, _) = call(&app, Method::GET, "/api/me/context", Some(f.orphan_user), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn context_reports_the_resolved_scope() {
    let f = Fixture::new();

    let (status, body) = call(&app(&f), Method::GET, "/api/me/context", Some(f.user), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["context"]["organizationId"], json!(f.org));
    assert_eq!(body["context"]["branchId"], json!(f.branch));
    assert_eq!(body["context"]["isSuperAdmin"], json!(false));
}

#[tokio::test]
async fn sale_is_created_with_profit_and_stock_goes_down() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, p2] = f.products;
    let [w1, _] = f.warehouses;
    stock(&app, &f, p1, w1, 10).await;
    stock(&app, &f, p2, w1, 10).await;

    let body = json!({
        "items": [
            { "productId": p1, "warehouseId": w1, "quantity": 2, "unitPrice": 100 },
            { "productId": p2, "warehouseId": w1, "quantity": 1, "unitPrice": 50 }
        ]
    });
    let (status, body) = call(&app, Method::POST, "/api/sales", Some(f.user), Some(body)).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["sale"]["totalAmount"].as_f64(), Some(250.0));
    assert_eq!(body["sale"]["profitAmount"].as_f64(), Some(80.0));
    assert_eq!(body["sale"]["items"].as_array().map(Vec::len), Some(2));
    assert_eq!(f.quantity(p1, w1).await, 8);

    let (status, body) = call(&app, Method::GET, "/api/sales", Some(f.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sales"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn insufficient_stock_is_a_conflict_with_both_numbers() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, _] = f.warehouses;
    stock(&app, &f, p1, w1, 1).await;

    let body = json!({ "items": [{ "productId": p1, "warehouseId": w1, "quantity": 3, "unitPrice": 100 }] });
    let (status, body) = call(&app, Method::POST, "/api/sales", Some(f.user), Some(body)).await;

    assert_eq!(status, StatusCode::CONFLICT);
    let details = body["details"].as_array().unwrap();
    assert!(details.contains(&json!("available: 1")));
    assert!(details.contains(&json!("requested: 3")));
    assert_eq!(f.quantity(p1, w1).await, 1);
}

#[tokio::test]
async fn invalid_payload_is_a_bad_request_with_details() {
    let f = Fixture::new();
    let [p1, _] = f.products;
    let [w1, _] = f.warehouses;

    let body = json!({ "items": [{ "productId": p1, "warehouseId": w1, "quantity": 0, "unitPrice": -1 }] });
    let (status, body) = call(&app(&f), Method::POST, "/api/sales", Some(f.user), Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn foreign_and_missing_rows_answer_the_same_404() {
    let f = Fixture::new();
    let app = app(&f);
    let body = json!({
        "items": [{ "productId": f.foreign_product, "warehouseId": f.foreign_warehouse, "quantity": 1, "unitPrice": 2 }]
    });
    let (status, created) = call(&app, Method::POST, "/api/purchase-orders", Some(f.foreign_user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let foreign_id = created["purchaseOrder"]["id"].as_str().unwrap().to_string();

    let (foreign_status, foreign_body) =
        call(&app, Method::GET, &format!("/api/purchase-orders/{}", foreign_id), Some(f.user), None).await;
    let (missing_status, missing_body) =
        call(&app, Method::GET, &format!("/api/purchase-orders/{}", Uuid::new_v4()), Some(f.user), None).await;

    assert_eq!(foreign_status, StatusCode::NOT_FOUND);
    assert_eq!(foreign_status, missing_status);
    assert_eq!(foreign_body, missing_body);
}

#[tokio::test]
async fn super_admin_sees_every_branch() {
    let f = Fixture::new();
    let app = app(&f);
    let body = json!({ "productId": f.foreign_product, "toWarehouseId": f.foreign_warehouse, "quantity": 4 });
    let (status, _) = call(&app, Method::POST, "/api/stock-movements", Some(f.foreign_user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, own) = call(&app, Method::GET, "/api/stock-movements", Some(f.user), None).await;
    let (_, all) = call(&app, Method::GET, "/api/stock-movements", Some(f.super_admin), None).await;

    assert_eq!(own["movements"].as_array().map(Vec::len), Some(0));
    assert_eq!(all["movements"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn movement_with_sentinel_source_is_an_entry() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, w2] = f.warehouses;

    let body = json!({ "productId": p1, "fromWarehouseId": "none", "toWarehouseId": w1, "quantity": 6 });
    let (status, created) = call(&app, Method::POST, "/api/stock-movements", Some(f.user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["movement"]["fromWarehouseId"], Value::Null);

    let id = created["movement"]["id"].as_str().unwrap().to_string();
    let body = json!({ "productId": p1, "fromWarehouseId": w1, "toWarehouseId": w1, "quantity": 6 });
    let (status, _) = call(&app, Method::PUT, &format!("/api/stock-movements/{}", id), Some(f.user), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = json!({ "productId": p1, "fromWarehouseId": "none", "toWarehouseId": w2, "quantity": 6 });
    let (status, _) = call(&app, Method::PUT, &format!("/api/stock-movements/{}", id), Some(f.user), Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(f.quantity(p1, w1).await, 0);
    assert_eq!(f.quantity(p1, w2).await, 6);
}

#[tokio::test]
async fn guarded_deletes_answer_conflict() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, w2] = f.warehouses;
    stock(&app, &f, p1, w1, 1).await;

    let (status, body) = call(&app, Method::DELETE, &format!("/api/categories/{}", f.category), Some(f.user), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = call(&app, Method::DELETE, &format!("/api/warehouses/{}", w1), Some(f.user), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(&app, Method::DELETE, &format!("/api/warehouses/{}", w2), Some(f.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn valuation_and_openapi_are_served() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, _] = f.warehouses;
    stock(&app, &f, p1, w1, 2).await;

    let (status, body) = call(&app, Method::GET, &format!("/api/warehouses/{}/valuation", w1), Some(f.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valuation"]["projectedProfit"].as_f64(), Some(80.0));

    let (status, body) = call(&app, Method::GET, "/api/warehouses/valuation", Some(f.user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valuations"].as_array().map(Vec::len), Some(2));

    let (status, body) = call(&app, Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/sales"].is_object());
}

#[tokio::test]
async fn super_admin_writes_need_an_explicit_branch() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, _] = f.warehouses;

    let body = json!({ "productId": p1, "toWarehouseId": w1, "quantity": 2 });
    let (status, body) = call(&app, Method::POST, "/api/stock-movements", Some(f.super_admin), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let details = body["details"].as_array().unwrap();
    assert!(details.iter().any(|d| d.as_str().is_some_and(|d| d.starts_with("branchId"))));

    let body = json!({ "productId": p1, "toWarehouseId": w1, "quantity": 2, "branchId": f.branch });
    let (status, _) = call(&app, Method::POST, "/api/stock-movements", Some(f.super_admin), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(f.quantity(p1, w1).await, 2);
}

#[tokio::test]
async fn sale_patch_keeps_absent_fields_and_clears_nulls() {
    let f = Fixture::new();
    let app = app(&f);
    let [p1, _] = f.products;
    let [w1, _] = f.warehouses;
    stock(&app, &f, p1, w1, 5).await;

    let body = json!({
        "notes": "entregar à tarde",
        "items": [{ "productId": p1, "warehouseId": w1, "quantity": 1, "unitPrice": 100 }]
    });
    let (status, created) = call(&app, Method::POST, "/api/sales", Some(f.user), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/sales/{}", created["sale"]["id"].as_str().unwrap());

    let (status, body) = call(&app, Method::PATCH, &uri, Some(f.user), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sale"]["notes"], "entregar à tarde");

    let (status, body) = call(&app, Method::PATCH, &uri, Some(f.user), Some(json!({ "notes": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sale"]["notes"], Value::Null);
}
