//! Single logout across the front and back channel.

use fed_protocol_saml::bindings::{HttpRedirectBinding, SamlMessageType, SoapBinding};
use fed_protocol_saml::{status_codes, sub_status_codes, LogoutRequest, LogoutResponse};

use crate::common::{TestEnv, BROWSER_SP, DOWN_SP, SOAP_SP};

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn post_soap(env: &TestEnv, request: &LogoutRequest) -> anyhow::Result<LogoutResponse> {
    let response = env
        .client
        .post(env.url("/saml/slo/soap"))
        .header("content-type", "text/xml; charset=utf-8")
        .body(SoapBinding::wrap(&request.to_xml()))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 200);
    let body = response.text().await?;
    Ok(LogoutResponse::from_xml(&SoapBinding::unwrap(&body)?)?)
}

#[tokio::test]
async fn local_logout_over_soap_is_full() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-1", &[SOAP_SP]).await?;

    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", "s-1")])
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await?.contains(r#"data-logout="full""#));
    assert_eq!(env.mock.calls(), vec![SOAP_SP.to_string()]);
    assert!(!env.has_session(&key).await?);
    Ok(())
}

#[tokio::test]
async fn unreachable_partner_makes_logout_partial() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-2", &[DOWN_SP, SOAP_SP]).await?;

    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", "s-2")])
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 200);
    let page = response.text().await?;
    assert!(page.contains(r#"data-logout="partial""#));
    assert!(page.contains(&env.partner(DOWN_SP).entity_id));
    // The saga moved on to the next partner.
    assert_eq!(env.mock.calls(), vec![SOAP_SP.to_string()]);
    assert!(!env.has_session(&key).await?);
    Ok(())
}

#[tokio::test]
async fn logout_without_session_is_not_an_error() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", "nobody")])
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await?.contains(r#"data-logout="not-logged-in""#));
    Ok(())
}

#[tokio::test]
async fn foreign_return_to_is_refused() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-3", &[SOAP_SP]).await?;

    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", "s-3"), ("return_to", "https://evil.example.com/")])
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 400);
    assert!(env.has_session(&key).await?);
    assert!(env.mock.calls().is_empty());
    Ok(())
}

/// The browser is sent to the partner, comes back with a signed response and
/// is then sent to `return_to`. Replaying the response is rejected.
#[tokio::test]
async fn front_channel_round_trip() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-4", &[BROWSER_SP]).await?;
    let partner = env.partner(BROWSER_SP);

    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", "s-4"), ("return_to", "/done")])
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 307);
    let to_partner = location(&response);
    assert!(to_partner.contains("/browser/slo?SAMLRequest="));

    let decoded = HttpRedirectBinding::decode_url(&to_partner)?;
    let request = LogoutRequest::from_xml(&decoded.xml)?;
    assert_eq!(request.name_id.value, "alice");
    assert_eq!(request.session_indexes, vec!["idx-0".to_string()]);
    assert!(decoded.signature.is_some());
    let relay_state = decoded.relay_state;
    assert!(relay_state.is_some());
    assert_eq!(env.state.orchestrator.pending_attempts(), 1);

    let answer = LogoutResponse::success(&partner.entity_id)
        .in_response_to(&request.id)
        .with_destination(env.url("/saml/slo"));
    let back = HttpRedirectBinding::encode_signed(
        &answer.to_xml(),
        &env.url("/saml/slo"),
        relay_state.as_deref(),
        SamlMessageType::Response,
        &partner.signer,
        None,
    )?;

    let response = env.client.get(&back).send().await?;
    assert_eq!(response.status().as_u16(), 307);
    assert_eq!(location(&response), "/done");
    assert!(!env.has_session(&key).await?);
    assert_eq!(env.state.orchestrator.pending_attempts(), 0);
    assert!(env.mock.calls().is_empty());

    let replayed = env.client.get(&back).send().await?;
    assert_eq!(replayed.status().as_u16(), 403);
    Ok(())
}

#[tokio::test]
async fn unsigned_redirect_request_is_rejected() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-5", &[SOAP_SP]).await?;

    let request = env.logout_request(BROWSER_SP, &env.url("/saml/slo"));
    let url = HttpRedirectBinding::encode(
        &request.to_xml(),
        &env.url("/saml/slo"),
        None,
        SamlMessageType::Request,
    )?;

    let response = env.client.get(&url).send().await?;
    assert_eq!(response.status().as_u16(), 401);
    assert!(env.has_session(&key).await?);
    Ok(())
}

/// A partner logs the user out over SOAP; the other partner is called over
/// SOAP too and the initiator gets a signed success.
#[tokio::test]
async fn soap_initiated_logout() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-6", &[BROWSER_SP, SOAP_SP]).await?;
    let partner = env.partner(BROWSER_SP);

    let mut request = env
        .logout_request(BROWSER_SP, &env.url("/saml/slo/soap"))
        .with_session_indexes(["idx-0".to_string()]);
    partner.signer.sign_message(&mut request, None)?;

    let response = post_soap(&env, &request).await?;

    assert!(response.is_success());
    assert_eq!(response.in_response_to.as_deref(), Some(request.id.as_str()));
    assert!(response.signature.is_some());
    assert_eq!(env.mock.calls(), vec![SOAP_SP.to_string()]);
    assert!(!env.has_session(&key).await?);
    Ok(())
}

#[tokio::test]
async fn forged_soap_request_gets_request_denied() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-7", &[SOAP_SP]).await?;

    // Claims to come from SOAP_SP but is signed with another partner's key.
    let mut request = env.logout_request(SOAP_SP, &env.url("/saml/slo/soap"));
    env.partner(BROWSER_SP).signer.sign_message(&mut request, None)?;

    let response = post_soap(&env, &request).await?;

    assert_eq!(response.status.status_code.value, status_codes::REQUESTER);
    assert_eq!(
        response.status.status_code.sub_status_value(),
        Some(sub_status_codes::REQUEST_DENIED)
    );
    assert!(env.has_session(&key).await?);
    assert!(env.mock.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn soap_body_that_is_not_a_logout_request_gets_a_fault() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .post(env.url("/saml/slo/soap"))
        .body(SoapBinding::wrap("<Unrelated/>"))
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 500);
    assert!(response.text().await?.contains("soap:Fault"));
    Ok(())
}

/// A partner hands the browser a logout request through the POST binding.
/// The only other partner is logged out over SOAP and the browser is sent
/// back to the initiator with a signed response.
#[tokio::test]
async fn post_binding_request_from_partner() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let key = env.session("s-8", &[BROWSER_SP, SOAP_SP]).await?;
    let partner = env.partner(BROWSER_SP);

    let mut request = env.logout_request(BROWSER_SP, &env.url("/saml/slo"));
    partner.signer.sign_message(&mut request, None)?;
    let encoded = base64_encode(&request.to_xml());

    let response = env
        .client
        .post(env.url("/saml/slo"))
        .form(&[("SAMLRequest", encoded.as_str()), ("RelayState", "sp-state")])
        .send()
        .await?;

    assert_eq!(response.status().as_u16(), 307);
    let to_initiator = location(&response);
    assert!(to_initiator.contains("/browser/slo?SAMLResponse="));
    let decoded = HttpRedirectBinding::decode_url(&to_initiator)?;
    assert_eq!(decoded.relay_state.as_deref(), Some("sp-state"));
    let answer = LogoutResponse::from_xml(&decoded.xml)?;
    assert!(answer.is_success());
    assert_eq!(answer.in_response_to.as_deref(), Some(request.id.as_str()));

    assert_eq!(env.mock.calls(), vec![SOAP_SP.to_string()]);
    assert!(!env.has_session(&key).await?);
    Ok(())
}

fn base64_encode(xml: &str) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(xml)
}
