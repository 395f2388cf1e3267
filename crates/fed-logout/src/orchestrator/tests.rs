use fed_metadata::Binding;
use fed_protocol_saml::bindings::{Artifact, HttpRedirectBinding, SoapBinding};
use fed_protocol_saml::{LogoutRequest, LogoutResponse, NameId, Status};
use fed_session::{LogoutChannel, SessionKey, SessionStore};

use super::*;
use crate::testing::*;

fn success_from(entity_id: &str, attempt: &LogoutAttempt) -> LogoutResponse {
    LogoutResponse::success(entity_id).in_response_to(attempt.request_id.clone())
}

async fn pending(harness: &Harness, key: &SessionKey, entity_id: &str) -> (String, LogoutAttempt) {
    let saga = harness.saga_id(key).await;
    let attempt = harness
        .orchestrator
        .attempt(&AttemptKey::new(saga.as_str(), entity_id))
        .expect("attempt pending");
    (saga, attempt)
}

#[tokio::test]
async fn logout_without_session_reports_not_logged_in() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::Soap])]);

    let step = harness
        .orchestrator
        .begin_local(&SessionKey::new("missing"), Some("https://portal".to_string()))
        .await
        .unwrap();
    assert_eq!(
        step,
        LogoutStep::Finished {
            summary: LogoutSummary::NotLoggedIn,
            return_to: Some("https://portal".to_string()),
        }
    );

    let request = LogoutRequest::new(SP1, NameId::new("nobody"));
    let step = harness
        .orchestrator
        .begin_from_partner(&request, None, LogoutChannel::Back)
        .await
        .unwrap();
    let LogoutStep::SoapResponse(envelope) = step else {
        panic!("expected a SOAP answer, got {step:?}");
    };
    let response = LogoutResponse::from_xml(&SoapBinding::unwrap(&envelope).unwrap()).unwrap();
    assert!(response.is_success());
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    assert!(harness.peer.calls().is_empty());
}

#[tokio::test]
async fn soap_partners_are_logged_out_in_join_order() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::Soap]),
        Partner::new(SP2, &[Binding::Soap]),
    ]);
    let key = harness.session("tgt-1", &[SP2, SP1]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();

    assert_eq!(
        step,
        LogoutStep::Finished {
            summary: LogoutSummary::Full,
            return_to: None,
        }
    );
    assert_eq!(harness.peer.calls(), vec![soap_url(SP2), soap_url(SP1)]);
    assert!(harness.sessions.get(&key).await.unwrap().is_none());
    assert_eq!(harness.orchestrator.active_sagas(), 0);
}

#[tokio::test]
async fn unreachable_partner_does_not_stop_the_others() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::Soap]),
        Partner::new(SP2, &[Binding::Soap]),
        Partner::new(SP3, &[Binding::Soap]),
    ]);
    harness.peer.down.lock().insert(soap_url(SP2));
    let key = harness.session("tgt-1", &[SP1, SP2, SP3]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();

    let LogoutStep::Finished { summary, .. } = step else {
        panic!("expected the saga to finish, got {step:?}");
    };
    assert_eq!(summary, LogoutSummary::Partial(vec![SP2.to_string()]));
    assert_eq!(summary.status(), Status::partial_logout());
    assert_eq!(harness.peer.calls().len(), 3);
}

#[tokio::test]
async fn untrusted_participant_is_abandoned() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::Soap])]);
    let key = harness.session("tgt-1", &[SP1, "https://unknown.example.com"]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();

    let LogoutStep::Finished { summary, .. } = step else {
        panic!("expected the saga to finish, got {step:?}");
    };
    assert_eq!(summary.abandoned().to_vec(), vec!["https://unknown.example.com".to_string()]);
}

#[tokio::test]
async fn partner_without_logout_is_skipped() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::Soap]).without_logout(),
        Partner::new(SP2, &[Binding::Soap]),
    ]);
    let key = harness.session("tgt-1", &[SP1, SP2]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();

    assert!(matches!(
        step,
        LogoutStep::Finished {
            summary: LogoutSummary::Full,
            ..
        }
    ));
    assert_eq!(harness.peer.calls(), vec![soap_url(SP2)]);
}

#[tokio::test]
async fn front_channel_round_trip_continues_the_saga() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::HttpRedirect, Binding::Soap]),
        Partner::new(SP2, &[Binding::Soap]),
    ]);
    let key = harness.session("tgt-1", &[SP1, SP2]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();
    let LogoutStep::Redirect(url) = step else {
        panic!("expected a redirect, got {step:?}");
    };
    assert!(url.starts_with(&format!("{}?SAMLRequest=", front_url(SP1))));
    assert!(url.contains("RelayState="));
    assert!(url.contains("Signature="));
    assert!(harness.peer.calls().is_empty());

    let session = harness.sessions.get(&key).await.unwrap().unwrap();
    assert!(session.is_logging_out());
    assert_eq!(session.service_providers.len(), 1);
    assert_eq!(harness.orchestrator.pending_attempts(), 1);

    let (saga, attempt) = pending(&harness, &key, SP1).await;
    assert_eq!(attempt.binding, Binding::HttpRedirect);
    let response = success_from(SP1, &attempt);

    let step = harness
        .orchestrator
        .handle_response(&response, Some(&saga))
        .await
        .unwrap();
    assert!(matches!(
        step,
        LogoutStep::Finished {
            summary: LogoutSummary::Full,
            ..
        }
    ));
    assert_eq!(harness.peer.calls(), vec![soap_url(SP2)]);
    assert_eq!(harness.orchestrator.pending_attempts(), 0);

    // A replayed response finds nothing to settle.
    let step = harness
        .orchestrator
        .handle_response(&response, Some(&saga))
        .await
        .unwrap();
    assert_eq!(step, LogoutStep::not_logged_in());
    assert_eq!(harness.peer.calls().len(), 1);
}

#[tokio::test]
async fn response_without_relay_state_is_matched_by_in_response_to() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpPost])]);
    let key = harness.session("tgt-1", &[SP1]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();
    let LogoutStep::PostForm(html) = step else {
        panic!("expected a form, got {step:?}");
    };
    assert!(html.contains(r#"name="SAMLRequest""#));
    let (_, attempt) = pending(&harness, &key, SP1).await;

    let stranger = LogoutResponse::success(SP1).in_response_to("_other");
    let step = harness.orchestrator.handle_response(&stranger, None).await.unwrap();
    assert_eq!(step, LogoutStep::not_logged_in());
    assert_eq!(harness.orchestrator.pending_attempts(), 1);

    let step = harness
        .orchestrator
        .handle_response(&success_from(SP1, &attempt), None)
        .await
        .unwrap();
    assert!(matches!(
        step,
        LogoutStep::Finished {
            summary: LogoutSummary::Full,
            ..
        }
    ));
}

#[tokio::test]
async fn refusing_partner_is_abandoned() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpRedirect])]);
    let key = harness.session("tgt-1", &[SP1]).await;
    harness.orchestrator.begin_local(&key, None).await.unwrap();
    let (saga, attempt) = pending(&harness, &key, SP1).await;

    let refused = LogoutResponse::new(SP1, Status::responder_error("busy"))
        .in_response_to(attempt.request_id.clone());
    let step = harness
        .orchestrator
        .handle_response(&refused, Some(&saga))
        .await
        .unwrap();

    let LogoutStep::Finished { summary, .. } = step else {
        panic!("expected the saga to finish, got {step:?}");
    };
    assert_eq!(summary, LogoutSummary::Partial(vec![SP1.to_string()]));
}

#[tokio::test(start_paused = true)]
async fn deadline_falls_back_to_soap_and_stays_on_back_channel() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::HttpRedirect, Binding::Soap]),
        Partner::new(SP2, &[Binding::HttpRedirect, Binding::Soap]),
    ]);
    let key = harness.session("tgt-1", &[SP1, SP2]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();
    assert!(matches!(step, LogoutStep::Redirect(_)));

    tokio::time::sleep(REDIRECT_TIMEOUT + Duration::from_secs(1)).await;
    for _ in 0..100 {
        if harness.sessions.get(&key).await.unwrap().is_none() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(harness.sessions.get(&key).await.unwrap().is_none());
    assert_eq!(harness.peer.calls(), vec![soap_url(SP1), soap_url(SP2)]);
    assert_eq!(harness.orchestrator.pending_attempts(), 0);
    assert_eq!(harness.orchestrator.active_sagas(), 0);
}

#[tokio::test]
async fn deadline_without_back_channel_abandons_partner() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpRedirect])]);
    let key = harness.session("tgt-1", &[SP1]).await;
    harness.orchestrator.begin_local(&key, None).await.unwrap();
    let (_, attempt) = pending(&harness, &key, SP1).await;

    harness.orchestrator.on_deadline(attempt.key.clone()).await;

    assert!(harness.sessions.get(&key).await.unwrap().is_none());
    assert!(harness.peer.calls().is_empty());
    assert_eq!(harness.orchestrator.active_sagas(), 0);
}

#[tokio::test]
async fn response_and_deadline_race_settles_once() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpRedirect, Binding::Soap])]);
    let key = harness.session("tgt-1", &[SP1]).await;
    harness.orchestrator.begin_local(&key, None).await.unwrap();
    let (saga, attempt) = pending(&harness, &key, SP1).await;
    let response = success_from(SP1, &attempt);

    let (step, ()) = tokio::join!(
        harness.orchestrator.handle_response(&response, Some(&saga)),
        harness.orchestrator.on_deadline(attempt.key.clone()),
    );

    assert!(matches!(step.unwrap(), LogoutStep::Finished { .. }));
    assert!(harness.peer.calls().len() <= 1);
    assert_eq!(harness.orchestrator.pending_attempts(), 0);
    assert!(harness.sessions.get(&key).await.unwrap().is_none());

    // The loser arriving late is still a no-op.
    harness.orchestrator.on_deadline(attempt.key.clone()).await;
    assert!(harness.peer.calls().len() <= 1);
}

#[tokio::test]
async fn second_begin_leaves_running_saga_alone() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpRedirect])]);
    let key = harness.session("tgt-1", &[SP1]).await;

    harness.orchestrator.begin_local(&key, None).await.unwrap();
    let saga = harness.saga_id(&key).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();
    assert_eq!(step, LogoutStep::not_logged_in());
    assert_eq!(harness.saga_id(&key).await, saga);
    assert_eq!(harness.orchestrator.pending_attempts(), 1);
    assert_eq!(harness.orchestrator.active_sagas(), 1);
}

#[tokio::test]
async fn soap_initiated_logout_is_answered_over_soap() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::Soap]),
        Partner::new(SP2, &[Binding::HttpRedirect, Binding::Soap]),
    ]);
    harness.session("tgt-1", &[SP1, SP2]).await;
    let request = LogoutRequest::new(SP1, NameId::new("alice"));

    let step = harness
        .orchestrator
        .begin_from_partner(&request, None, LogoutChannel::Back)
        .await
        .unwrap();

    let LogoutStep::SoapResponse(envelope) = step else {
        panic!("expected a SOAP answer, got {step:?}");
    };
    let response = LogoutResponse::from_xml(&SoapBinding::unwrap(&envelope).unwrap()).unwrap();
    assert_eq!(response.issuer, IDP);
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    assert!(response.is_success());
    assert!(response.signature.is_some());
    // The initiator is not called back; the other partner is reached over SOAP.
    assert_eq!(harness.peer.calls(), vec![soap_url(SP2)]);
}

#[tokio::test]
async fn front_initiated_logout_is_answered_through_the_browser() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::HttpRedirect]),
        Partner::new(SP2, &[Binding::Soap]),
    ]);
    harness.session("tgt-1", &[SP1, SP2]).await;
    let request = LogoutRequest::new(SP1, NameId::new("alice"));

    let step = harness
        .orchestrator
        .begin_from_partner(&request, Some("sp-state"), LogoutChannel::Front)
        .await
        .unwrap();

    let LogoutStep::Redirect(url) = step else {
        panic!("expected a redirect, got {step:?}");
    };
    assert!(url.starts_with(&format!("{}?SAMLResponse=", front_url(SP1))));
    assert!(url.contains("RelayState=sp-state"));
}

/// The browser sent to SP2 is slow, so SP2 is logged out over SOAP. When it
/// finally returns, SP1 still gets its answer through the browser.
#[tokio::test]
async fn late_browser_after_deadline_still_answers_front_initiator() {
    let harness = Harness::new(&[
        Partner::new(SP1, &[Binding::HttpRedirect]),
        Partner::new(SP2, &[Binding::HttpRedirect, Binding::Soap]),
    ]);
    let key = harness.session("tgt-1", &[SP1, SP2]).await;
    let request = LogoutRequest::new(SP1, NameId::new("alice"));

    let step = harness
        .orchestrator
        .begin_from_partner(&request, Some("sp-state"), LogoutChannel::Front)
        .await
        .unwrap();
    let LogoutStep::Redirect(url) = step else {
        panic!("expected a redirect to SP2, got {step:?}");
    };
    assert!(url.starts_with(&format!("{}?SAMLRequest=", front_url(SP2))));
    let (saga, attempt) = pending(&harness, &key, SP2).await;

    harness.orchestrator.on_deadline(attempt.key.clone()).await;
    assert_eq!(harness.peer.calls(), vec![soap_url(SP2)]);
    assert!(harness.sessions.get(&key).await.unwrap().is_none());
    assert_eq!(harness.orchestrator.active_sagas(), 0);
    assert_eq!(harness.orchestrator.held_answers(), 1);

    // Another partner cannot claim the answer.
    let stranger = LogoutResponse::success(SP1).in_response_to(attempt.request_id.clone());
    let step = harness
        .orchestrator
        .handle_response(&stranger, Some(&saga))
        .await
        .unwrap();
    assert_eq!(step, LogoutStep::not_logged_in());
    assert_eq!(harness.orchestrator.held_answers(), 1);

    let step = harness
        .orchestrator
        .handle_response(&success_from(SP2, &attempt), Some(&saga))
        .await
        .unwrap();
    let LogoutStep::Redirect(url) = step else {
        panic!("expected a redirect to SP1, got {step:?}");
    };
    assert!(url.starts_with(&format!("{}?SAMLResponse=", front_url(SP1))));
    let decoded = HttpRedirectBinding::decode_url(&url).unwrap();
    assert_eq!(decoded.relay_state.as_deref(), Some("sp-state"));
    let answer = LogoutResponse::from_xml(&decoded.xml).unwrap();
    assert!(answer.is_success());
    assert_eq!(answer.in_response_to.as_deref(), Some(request.id.as_str()));
    assert_eq!(harness.orchestrator.held_answers(), 0);

    // The answer is handed out once.
    let step = harness
        .orchestrator
        .handle_response(&success_from(SP2, &attempt), Some(&saga))
        .await
        .unwrap();
    assert_eq!(step, LogoutStep::not_logged_in());
}

#[tokio::test]
async fn artifact_binding_parks_the_request() {
    let harness = Harness::new(&[Partner::new(SP1, &[Binding::HttpArtifact])]);
    let key = harness.session("tgt-1", &[SP1]).await;

    let step = harness.orchestrator.begin_local(&key, None).await.unwrap();
    let LogoutStep::Redirect(url) = step else {
        panic!("expected a redirect, got {step:?}");
    };
    assert!(url.starts_with(&format!("{}?SAMLart=", front_url(SP1))));

    let (_, attempt) = pending(&harness, &key, SP1).await;
    let artifact = Artifact::new(ARTIFACT_URL, &attempt.request_id);
    let Some(ProtocolMessage::LogoutRequest(parked)) =
        harness.artifacts.take(&artifact).await.unwrap()
    else {
        panic!("artifact should dereference to the LogoutRequest");
    };
    assert_eq!(parked.destination.as_deref(), Some(front_url(SP1).as_str()));
    assert!(parked.signature.is_some());
}
