use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use cashbook::api::{self, AppState};
use cashbook::date::{CalendarDate, DisplayZone};
use cashbook::service::{CashEntryInput, Cashbook, DatePolicy, WorkOrderInput};
use cashbook::storage::{InMemoryStorage, SqliteStorage, StorageBackend};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use time::{macros::offset, UtcOffset};
use tower::ServiceExt;

fn zones() -> Vec<DisplayZone> {
    vec![
        DisplayZone::new(offset!(-3)),
        DisplayZone::new(UtcOffset::UTC),
        DisplayZone::new(offset!(+9)),
    ]
}

fn backends() -> Vec<Arc<dyn StorageBackend>> {
    vec![
        Arc::new(InMemoryStorage::new()),
        Arc::new(SqliteStorage::new(":memory:").unwrap()),
    ]
}

fn setup(storage: Arc<dyn StorageBackend>, zone: DisplayZone) -> Cashbook {
    Cashbook::new(
        storage,
        DatePolicy {
            zone,
            allow_missing_date: false,
        },
    )
}

fn cash_input(date: &str, credit: &str, debit: &str) -> CashEntryInput {
    CashEntryInput {
        date: Some(date.to_string()),
        work_order: Some("1110".to_string()),
        credit: Some(credit.parse().unwrap()),
        debit: Some(debit.parse().unwrap()),
        debit_note: Some("Material".to_string()),
    }
}

#[test]
fn test_date_displays_the_same_in_every_zone() {
    for storage in backends() {
        for zone in zones() {
            let book = setup(storage.clone(), zone);
            let created = book.create_cash(cash_input("2025-09-10", "100", "0")).unwrap();
            assert_eq!(created.date.to_string(), "2025-09-10");
            assert_eq!(created.date_display, "10/09/2025");

            let listed = book.list_cash(Some("2025-09-10")).unwrap();
            assert!(listed.iter().all(|v| v.date_display == "10/09/2025"));
        }
    }
}

#[test]
fn test_timestamped_input_keeps_written_day() {
    for storage in backends() {
        let tokyo = setup(storage.clone(), DisplayZone::new(offset!(+9)));
        let created = tokyo
            .create_work_order(WorkOrderInput {
                date: Some("2025-09-10T23:30:00-03:00".to_string()),
                number: Some("1111".to_string()),
                released_by: Some("Joao".to_string()),
                collected_by: Some("Maria".to_string()),
            })
            .unwrap();
        assert_eq!(created.date.to_string(), "2025-09-10");

        let sao_paulo = setup(storage, DisplayZone::SAO_PAULO);
        let listed = sao_paulo.list_work_orders(None).unwrap();
        assert_eq!(listed[0].date_display, "10/09/2025");
    }
}

#[test]
fn test_round_trip_across_dst_transitions() {
    // 2018-11-04: Brazil's last DST start. 2025-03-09 and 2025-03-30: US and EU.
    for start in ["2018-10-20", "2025-02-20"] {
        for storage in backends() {
            let book = setup(storage, DisplayZone::SAO_PAULO);
            let mut date = CalendarDate::parse(start).unwrap();
            let mut written = Vec::new();
            for _ in 0..100 {
                let stored = book
                    .create_cash(cash_input(&date.to_storage_string(), "1", "0"))
                    .unwrap();
                assert_eq!(stored.date, date);
                written.push(date.to_storage_string());
                date = date.next_day().unwrap();
            }

            let read: Vec<String> = book
                .list_cash(None)
                .unwrap()
                .into_iter()
                .map(|v| v.date.to_storage_string())
                .collect();
            assert_eq!(read, written);

            for day in &written {
                let one = book.list_cash(Some(day)).unwrap();
                assert_eq!(one.len(), 1);
                assert_eq!(&one[0].date.to_storage_string(), day);
            }
        }
    }
}

#[test]
fn test_net_value_is_exact_through_storage() {
    for storage in backends() {
        let book = setup(storage, DisplayZone::SAO_PAULO);
        let view = book.create_cash(cash_input("2025-09-09", "200.00", "50.00")).unwrap();
        assert_eq!(view.net, dec!(150.00));
        assert_eq!(view.net.to_string(), "150.00");

        for _ in 0..50 {
            book.create_cash(cash_input("2025-09-10", "0.10", "0.20")).unwrap();
            book.create_cash(cash_input("2025-09-10", "0.20", "0.10")).unwrap();
        }
        let report = book.daily_report(Some("2025-09-10")).unwrap();
        assert_eq!(report.totals.credit, dec!(15.00));
        assert_eq!(report.totals.debit, dec!(15.00));
        assert_eq!(report.totals.net.to_string(), "0.00");
    }
}

#[test]
fn test_update_replaces_every_field() {
    for storage in backends() {
        let book = setup(storage, DisplayZone::SAO_PAULO);
        let created = book.create_cash(cash_input("2025-09-10", "100", "0")).unwrap();
        let updated = book
            .update_cash(
                created.id,
                CashEntryInput {
                    date: Some("11/09/2025".to_string()),
                    credit: Some(dec!(80)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.date.to_string(), "2025-09-11");
        assert_eq!(updated.work_order, "");
        assert_eq!(updated.debit_note, "");
        assert_eq!(updated.credit.to_string(), "80.00");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);
    }
}

#[test]
fn test_daily_report_groups_one_day() {
    for storage in backends() {
        let book = setup(storage, DisplayZone::SAO_PAULO);
        book.create_cash(cash_input("2025-09-10", "100.00", "0.00")).unwrap();
        book.create_cash(cash_input("2025-09-10", "0.00", "0.00")).unwrap();
        book.create_cash(cash_input("2025-09-09", "200.00", "50.00")).unwrap();
        book.create_work_order(WorkOrderInput {
            date: Some("2025-09-10".to_string()),
            number: Some("1111".to_string()),
            released_by: Some("Joao".to_string()),
            collected_by: Some("Maria".to_string()),
        })
        .unwrap();

        let view = book.daily_report_view(Some("2025-09-10")).unwrap();
        assert_eq!(view.date_display, "10/09/2025");
        assert_eq!(view.cash_entries.len(), 2);
        assert_eq!(view.work_orders.len(), 1);
        assert_eq!(view.totals.net.to_string(), "100.00");

        let text = book.daily_report(Some("2025-09-10")).unwrap().to_string();
        assert!(text.contains("Daily report 10/09/2025"));
        assert!(text.contains("Joao"));
    }
}

// --- HTTP ---

fn app() -> Router {
    let book = setup(Arc::new(InMemoryStorage::new()), DisplayZone::SAO_PAULO);
    api::router(AppState::new(book, None))
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_http_cash_lifecycle() {
    let router = app();

    let (status, created) = send(
        &router,
        "POST",
        "/cash",
        Some(json!({"date": "2025-09-10", "work_order": "1111", "credit": 200.00, "debit": "50.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["date"], "2025-09-10");
    assert_eq!(created["date_display"], "10/09/2025");
    assert_eq!(created["net"], "150.00");
    let id = created["id"].as_i64().unwrap();

    let (status, listed) = send(&router, "GET", "/cash?date=2025-09-10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        &router,
        "PUT",
        &format!("/cash/{}", id),
        Some(json!({"date": "2025-09-11", "work_order": "1111", "credit": "10"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["date_display"], "11/09/2025");
    assert_eq!(updated["debit"], "0.00");

    let (status, body) = send(&router, "DELETE", &format!("/cash/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = send(&router, "DELETE", &format!("/cash/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_http_rejects_bad_dates() {
    let router = app();

    let (status, body) = send(&router, "POST", "/cash", Some(json!({"credit": 10}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "date is required");

    let (status, _) = send(&router, "POST", "/work-orders", Some(json!({"date": "2025-02-30", "number": "1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&router, "GET", "/cash?date=10-09", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_http_malformed_requests_get_json_errors() {
    let router = app();

    let (status, body) = send(&router, "POST", "/cash", Some(json!({"date": "2025-09-10", "credit": "abc"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(!body["error"].as_str().unwrap().is_empty());

    let resp = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/cash")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers()["content-type"], "application/json");
    let bytes = hyper::body::to_bytes(resp.into_body()).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);

    let (status, body) = send(&router, "DELETE", "/cash/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, body) = send(&router, "GET", "/work-orders/abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_http_rejects_amount_above_column_limit() {
    let router = app();

    let (status, body) = send(
        &router,
        "POST",
        "/cash",
        Some(json!({"date": "2025-09-10", "credit": "40000000000000000000000000000"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().starts_with("credit must be at most"));

    let (status, report) = send(&router, "GET", "/report?date=2025-09-10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["totals"]["credit"], "0.00");
}

#[tokio::test]
async fn test_http_get_single_record() {
    let router = app();

    let (_, created) = send(
        &router,
        "POST",
        "/work-orders",
        Some(json!({"date": "10/09/2025", "number": "1111", "collected_by": "Maria"})),
    )
    .await;
    let id = created["id"].as_i64().unwrap();

    let (status, fetched) = send(&router, "GET", &format!("/work-orders/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["date"], "2025-09-10");
    assert_eq!(fetched["date_display"], "10/09/2025");

    let (status, body) = send(&router, "GET", "/cash/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_http_work_orders_and_report() {
    let router = app();

    let (status, _) = send(
        &router,
        "POST",
        "/work-orders",
        Some(json!({"date": "2025-09-10", "number": "1111", "released_by": "Joao", "collected_by": "Maria"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    send(&router, "POST", "/cash", Some(json!({"date": "2025-09-10", "credit": 100}))).await;

    let (status, report) = send(&router, "GET", "/report?date=2025-09-10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["date_display"], "10/09/2025");
    assert_eq!(report["work_orders"][0]["collected_by"], "Maria");
    assert_eq!(report["totals"]["credit"], "100.00");

    let (status, _) = send(
        &router,
        "PUT",
        "/work-orders/99",
        Some(json!({"date": "2025-09-10", "number": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_health() {
    let router = app();
    let (status, body) = send(&router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "online");
    assert_eq!(body["database"]["backend"], "memory");
    assert!(body["database"]["version"].as_str().unwrap().starts_with("cashbook-memory"));
    assert_eq!(body["database"]["tables"]["cash_entries"]["records"], 0);

    let (status, _) = send(&router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
