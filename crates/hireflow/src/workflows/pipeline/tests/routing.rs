use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::pipeline::router::history_handler;
use crate::workflows::pipeline::{CandidacyRepository, PipelineApi, PipelineState};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn transition_body(target: &str, actor_id: &str, role: &str) -> Value {
    json!({
        "target": target,
        "actor": { "id": actor_id, "role": role },
    })
}

#[tokio::test]
async fn transition_route_moves_the_pairing() {
    let h = harness();
    let id = h.pairing(1);

    let response = h
        .router()
        .oneshot(post_json(
            &format!("/api/v1/pairings/{}/transition", id.0),
            transition_body("tests_done", "ops-automation", "system"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["record"]["state"], "tests_done");
    assert_eq!(payload["transition"]["previous_state"], "competency_review");
    assert_eq!(h.state(id), PipelineState::TestsDone);
}

#[tokio::test]
async fn transition_errors_map_to_status_codes() {
    let h = harness();
    let id = h.pairing(1);
    let uri = format!("/api/v1/pairings/{}/transition", id.0);

    let invalid = h
        .router()
        .oneshot(post_json(&uri, transition_body("hired", "recruiter-ana", "company")))
        .await
        .expect("route executes");
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json_body(invalid).await["kind"], "invalid_transition");

    h.advance_to(id, PipelineState::CompanyInterest);
    let forbidden = h
        .router()
        .oneshot(post_json(
            &uri,
            transition_body("interview_accepted", "recruiter-ana", "company"),
        ))
        .await
        .expect("route executes");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let missing = h
        .router()
        .oneshot(post_json(
            "/api/v1/pairings/999/transition",
            transition_body("tests_done", "ops-automation", "system"),
        ))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn locked_pairing_returns_conflict() {
    let h = harness();
    let id = h.pairing(1);
    let held = h.store.begin(id).expect("lock held");

    let response = h
        .router()
        .oneshot(post_json(
            &format!("/api/v1/pairings/{}/transition", id.0),
            transition_body("tests_done", "ops-automation", "system"),
        ))
        .await
        .expect("route executes");
    drop(held);

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json_body(response).await["kind"], "conflict");
}

#[tokio::test]
async fn hire_without_salary_is_unprocessable() {
    let h = harness();
    h.matching.match_job(UNPRICED_JOB).expect("matching runs");
    let id = h
        .store
        .find_by_pair(UNPRICED_JOB, crate::workflows::domain::CandidateId(1))
        .expect("lookup")
        .expect("pairing")
        .id;
    h.advance_to(id, PipelineState::Selected);

    let response = h
        .router()
        .oneshot(post_json(
            &format!("/api/v1/pairings/{}/transition", id.0),
            transition_body("hired", "recruiter-ana", "company"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json_body(response).await["kind"], "precondition");
}

#[tokio::test]
async fn company_view_redacts_identity_until_consent() {
    let h = harness();
    let id = h.pairing(1);
    h.advance_to(id, PipelineState::CompanyInterest);
    let uri = format!("/api/v1/pairings/{}?view=company", id.0);

    let redacted = read_json_body(
        h.router()
            .oneshot(get(&uri))
            .await
            .expect("route executes"),
    )
    .await;
    assert!(redacted.get("candidate_id").is_none());
    assert_eq!(redacted["resume_visible"], false);

    h.advance_to(id, PipelineState::InterviewAccepted);
    let disclosed = read_json_body(
        h.router()
            .oneshot(get(&uri))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(disclosed["candidate_id"], 1);
    assert_eq!(disclosed["resume_visible"], true);
}

#[tokio::test]
async fn candidate_view_hides_the_job_until_interest() {
    let h = harness();
    let id = h.pairing(1);
    let uri = format!("/api/v1/pairings/{}?view=candidate", id.0);

    let hidden = read_json_body(
        h.router()
            .oneshot(get(&uri))
            .await
            .expect("route executes"),
    )
    .await;
    assert!(hidden.get("job_id").is_none());

    h.advance_to(id, PipelineState::CompanyInterest);
    let shown = read_json_body(
        h.router()
            .oneshot(get(&uri))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(shown["job_id"], JOB.0);
}

#[tokio::test]
async fn job_candidates_get_is_a_redacted_read_only_ranking() {
    let h = harness();
    let pairings_before = h.store.for_job(UNPRICED_JOB).expect("pairings").len();

    let response = h
        .router()
        .oneshot(get(&format!("/api/v1/jobs/{}/candidates", UNPRICED_JOB.0)))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let tier1 = payload["tier1"].as_array().expect("tier1 entries");
    assert_eq!(tier1.len(), 2);
    assert!(tier1.iter().all(|entry| entry.get("candidate_id").is_none()));
    assert!(tier1.iter().all(|entry| entry.get("candidacy_id").is_none()));
    assert_eq!(tier1[0]["score"], 12);
    assert!(payload.get("opened").is_none());
    assert_eq!(pairings_before, 0);
    assert_eq!(h.store.for_job(UNPRICED_JOB).expect("pairings").len(), 0);

    let missing = h
        .router()
        .oneshot(get("/api/v1/jobs/77/candidates"))
        .await
        .expect("route executes");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn job_candidates_post_opens_pairings_without_naming_candidates() {
    let h = harness();

    let response = h
        .router()
        .oneshot(
            Request::post(format!("/api/v1/jobs/{}/candidates", JOB.0))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["opened"], 0);
    assert_eq!(payload["refreshed"], 0);
    assert_eq!(payload["tier1"][0]["candidacy_id"], h.pairing(3).0);
    assert!(payload["tier1"][0].get("candidate_id").is_none());
    assert_eq!(payload["tier2"][0]["candidacy_id"], h.pairing(2).0);

    let opened = h
        .router()
        .oneshot(
            Request::post(format!("/api/v1/jobs/{}/candidates", UNPRICED_JOB.0))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(read_json_body(opened).await["opened"], 3);
}

#[tokio::test]
async fn transition_responses_withhold_identity_until_consent() {
    let h = harness();
    let id = h.pairing(1);
    h.advance_to(id, PipelineState::TestsDone);
    let uri = format!("/api/v1/pairings/{}/transition", id.0);

    let interest = read_json_body(
        h.router()
            .oneshot(post_json(
                &uri,
                transition_body("company_interest", "recruiter-ana", "company"),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(interest["record"]["state"], "company_interest");
    assert!(interest["record"].get("candidate_id").is_none());
    assert_eq!(interest["record"]["resume_visible"], false);

    let consent = read_json_body(
        h.router()
            .oneshot(post_json(
                &uri,
                transition_body("interview_accepted", "candidate-self", "candidate"),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(consent["record"]["job_id"], JOB.0);
    assert!(consent["record"].get("candidate_id").is_none());
    assert!(consent.get("charge").is_none());

    let selected = read_json_body(
        h.router()
            .oneshot(post_json(
                &uri,
                transition_body("selected", "recruiter-ana", "company"),
            ))
            .await
            .expect("route executes"),
    )
    .await;
    assert_eq!(selected["record"]["candidate_id"], 1);
}

#[tokio::test]
async fn rejected_pairings_hide_identity_from_the_company_again() {
    let h = harness();
    let id = h.pairing(1);
    h.advance_to(id, PipelineState::InterviewAccepted);

    let rejected = read_json_body(
        h.router()
            .oneshot(post_json(
                &format!("/api/v1/pairings/{}/transition", id.0),
                transition_body("rejected", "recruiter-ana", "company"),
            ))
            .await
            .expect("route executes"),
    )
    .await;

    assert_eq!(rejected["record"]["state"], "rejected");
    assert!(rejected["record"].get("candidate_id").is_none());
}

#[tokio::test]
async fn payment_and_refund_routes_drive_the_warranty() {
    let h = harness();
    let id = h.pairing(1);
    h.advance_to(id, PipelineState::Hired);
    let charge = h.open_charge(id);

    let paid = h
        .router()
        .oneshot(post_json(
            &format!("/api/v1/pairings/{}/payment", id.0),
            serde_json::to_value(payment_for(&charge)).unwrap(),
        ))
        .await
        .expect("route executes");
    assert_eq!(paid.status(), StatusCode::OK);
    assert_eq!(h.state(id), PipelineState::UnderWarranty);

    h.clock.advance_days(10);
    let refund = h
        .router()
        .oneshot(post_json(
            &format!("/api/v1/pairings/{}/refund-request", id.0),
            json!({ "actor_id": "recruiter-ana", "reason": "probation failed" }),
        ))
        .await
        .expect("route executes");
    assert_eq!(refund.status(), StatusCode::OK);
    let payload = read_json_body(refund).await;
    assert_eq!(payload["record"]["state"], "refund_requested");
    assert_eq!(payload["record"]["refund"]["amount"], 450_000);
}

#[tokio::test]
async fn transitions_report_filters_by_state() {
    let h = harness();
    h.advance_to(h.pairing(1), PipelineState::TestsDone);

    let response = h
        .router()
        .oneshot(get("/api/v1/transitions?state=tests_done"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let rows = read_json_body(response).await;
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["new_state"], "tests_done");
}

#[tokio::test]
async fn sweep_routes_report_their_work() {
    let h = harness();
    let id = h.pairing(1);
    h.advance_to(id, PipelineState::UnderWarranty);
    h.clock.advance_days(91);

    let warranty = h
        .router()
        .oneshot(Request::post("/api/v1/sweeps/warranty").body(Body::empty()).unwrap())
        .await
        .expect("route executes");
    assert_eq!(warranty.status(), StatusCode::OK);
    assert_eq!(read_json_body(warranty).await["completed"], json!([id.0]));

    let billing = h
        .router()
        .oneshot(Request::post("/api/v1/sweeps/billing").body(Body::empty()).unwrap())
        .await
        .expect("route executes");
    assert_eq!(billing.status(), StatusCode::OK);
    assert_eq!(read_json_body(billing).await["overdue"], json!([]));
}

#[tokio::test]
async fn history_handler_returns_the_audit_chain() {
    let h = harness();
    let id = h.pairing(3);
    h.advance_to(id, PipelineState::CompanyInterest);

    let response = history_handler(
        State(PipelineApi::new(h.pipeline.clone(), h.matching.clone())),
        Path(id.0),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let rows = read_json_body(response).await;
    assert_eq!(rows.as_array().map(Vec::len), Some(3));
    assert_eq!(rows[0]["actor_id"], "matching-engine");
}
