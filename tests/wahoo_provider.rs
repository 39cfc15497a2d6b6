// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Wahoo API client against a mock server

use chrono::{TimeZone, Utc};
use mockito::{Matcher, Server};
use std::sync::Arc;

use wahoo_coach::models::NewWorkout;
use wahoo_coach::oauth2_client::StaticToken;
use wahoo_coach::providers::wahoo::WahooProvider;
use wahoo_coach::providers::ProviderError;
use wahoo_coach::sync::{read_all, Boundary, SyncError};

const PAGE_BODY: &str = r#"{
    "workouts": [
        {
            "id": 2,
            "starts": "2024-01-16T07:00:00.000Z",
            "minutes": 50,
            "name": "Tempo",
            "plan_id": 9,
            "route_id": null,
            "workout_token": "tok-2",
            "workout_type_id": 1,
            "day_code": null,
            "workout_summary": {"distance_accum": "10000.0", "speed_avg": "3.333"},
            "created_at": "2024-01-16T08:00:00.000Z",
            "updated_at": "2024-01-16T08:00:00.000Z"
        },
        {
            "id": 1,
            "starts": "2024-01-15T07:00:00.000Z",
            "minutes": 30,
            "name": "Easy",
            "plan_id": null,
            "route_id": null,
            "workout_token": "tok-1",
            "workout_type_id": 1,
            "day_code": null,
            "workout_summary": null,
            "created_at": "2024-01-15T08:00:00.000Z",
            "updated_at": "2024-01-15T08:00:00.000Z"
        }
    ],
    "total": 2,
    "page": 1,
    "per_page": 30,
    "order": "descending",
    "sort": "starts"
}"#;

fn provider(server: &Server) -> WahooProvider {
    WahooProvider::new(server.url(), Arc::new(StaticToken("test-token".to_string())))
}

#[tokio::test]
async fn test_get_workouts_page() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/workouts")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("page".into(), "1".into()),
            Matcher::UrlEncoded("per_page".into(), "30".into()),
        ]))
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(PAGE_BODY)
        .create_async()
        .await;

    let page = provider(&server).get_workouts_page(1, 30).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.total, 2);
    assert_eq!(page.workouts[0].name, "Tempo");
    assert_eq!(page.workouts[0].distance_m(), Some(10000.0));
    assert_eq!(page.workouts[1].workout_summary, None);
}

#[tokio::test]
async fn test_read_all_through_provider() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/workouts")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(PAGE_BODY)
        .expect(1)
        .create_async()
        .await;

    let after = Utc.with_ymd_and_hms(2024, 1, 15, 7, 0, 0).unwrap();
    let workouts = read_all(&provider(&server), Boundary::After(after), 30).await.unwrap();

    assert_eq!(workouts.len(), 1);
    assert_eq!(workouts[0].id, 2);
}

#[tokio::test]
async fn test_error_status_carries_body() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/v1/workouts")
        .match_query(Matcher::Any)
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error":"Unauthorized"}"#)
        .create_async()
        .await;

    let error = read_all(&provider(&server), Boundary::None, 30).await.unwrap_err();

    match error {
        SyncError::Provider(ProviderError::Status { operation, status, body }) => {
            assert_eq!(operation, "list workouts");
            assert_eq!(status, 401);
            assert!(body.contains("Unauthorized"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_create_plan_sends_data_url() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/plans")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("plan%5Bfile%5D=data%3Aapplication%2Fjson%3Bbase64%2CeyJhIjoxfQ%3D%3D".into()),
            Matcher::Regex("plan%5Bexternal_id%5D=ext-1".into()),
            Matcher::Regex("plan%5Bfilename%5D=plan.json".into()),
        ]))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 77, "external_id": "ext-1", "name": "Today's workout"}"#)
        .create_async()
        .await;

    let plan = provider(&server).create_plan("eyJhIjoxfQ==", "ext-1").await.unwrap();

    mock.assert_async().await;
    assert_eq!(plan.id, 77);
    assert_eq!(plan.external_id.as_deref(), Some("ext-1"));
}

#[tokio::test]
async fn test_update_and_delete_plan() {
    let mut server = Server::new_async().await;
    let update = server
        .mock("PUT", "/v1/plans/77")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 77}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1/plans/77")
        .with_status(204)
        .create_async()
        .await;

    let provider = provider(&server);
    let plan = provider.update_plan(77, "eyJhIjoxfQ==", "ext-1").await.unwrap();
    provider.delete_plan(77).await.unwrap();

    update.assert_async().await;
    delete.assert_async().await;
    assert_eq!(plan.id, 77);
}

#[tokio::test]
async fn test_delete_missing_plan_is_an_error() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/v1/plans/5")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;

    let error = provider(&server).delete_plan(5).await.unwrap_err();
    assert_eq!(error.status(), Some(404));
}

#[tokio::test]
async fn test_create_and_delete_workout() {
    let mut server = Server::new_async().await;
    let create = server
        .mock("POST", "/v1/workouts")
        .match_body(Matcher::Regex("workout%5Bname%5D=Long\\+run".into()))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "id": 31,
                "starts": "2024-02-01T06:30:00.000Z",
                "minutes": 90,
                "name": "Long run",
                "plan_id": null,
                "route_id": null,
                "workout_token": "tok-31",
                "workout_type_id": 1,
                "day_code": null,
                "workout_summary": null,
                "created_at": "2024-02-01T06:30:00.000Z",
                "updated_at": "2024-02-01T06:30:00.000Z"
            }"#,
        )
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1/workouts/31")
        .with_status(204)
        .create_async()
        .await;

    let provider = provider(&server);
    let workout = NewWorkout {
        name: "Long run".to_string(),
        starts: Utc.with_ymd_and_hms(2024, 2, 1, 6, 30, 0).unwrap(),
        minutes: 90,
        workout_token: "tok-31".to_string(),
        workout_type_id: 1,
        plan_id: None,
    };
    let created = provider.create_workout(&workout).await.unwrap();
    provider.delete_workout(created.id).await.unwrap();

    create.assert_async().await;
    delete.assert_async().await;
    assert_eq!(created.minutes, 90);
}

#[tokio::test]
async fn test_download_file() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/files/31.fit")
        .with_status(200)
        .with_body(vec![14u8, 16, 1, 2])
        .create_async()
        .await;

    let bytes = provider(&server)
        .download_file(&format!("{}/files/31.fit", server.url()))
        .await
        .unwrap();
    assert_eq!(bytes, vec![14u8, 16, 1, 2]);
}
