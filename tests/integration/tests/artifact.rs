//! Artifact binding: the partner dereferences the logout request over SOAP.

use fed_protocol_saml::bindings::SoapBinding;
use fed_protocol_saml::{ArtifactResolve, ArtifactResponse, LogoutResponse, ProtocolMessage};

use crate::common::{TestEnv, ARTIFACT_SP};

async fn resolve(env: &TestEnv, request: &ArtifactResolve) -> anyhow::Result<reqwest::Response> {
    Ok(env
        .client
        .post(env.url("/saml/artifact"))
        .header("content-type", "text/xml; charset=utf-8")
        .body(SoapBinding::wrap(&request.to_xml()))
        .send()
        .await?)
}

/// Starts logout for a session held only by the artifact partner and returns
/// the artifact and relay state from the redirect.
async fn start(env: &TestEnv, session: &str) -> anyhow::Result<(String, Option<String>)> {
    env.session(session, &[ARTIFACT_SP]).await?;
    let response = env
        .client
        .get(env.url("/saml/logout"))
        .query(&[("session", session)])
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 307);

    let location = response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let url = reqwest::Url::parse(location)?;
    assert!(url.path().ends_with("/artifact/slo"));

    let mut artifact = None;
    let mut relay_state = None;
    for (name, value) in url.query_pairs() {
        match name.as_ref() {
            "SAMLart" => artifact = Some(value.into_owned()),
            "RelayState" => relay_state = Some(value.into_owned()),
            _ => {}
        }
    }
    let artifact = artifact.ok_or_else(|| anyhow::anyhow!("redirect carries no SAMLart"))?;
    Ok((artifact, relay_state))
}

#[tokio::test]
async fn artifact_resolves_once_and_logout_completes() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let partner = env.partner(ARTIFACT_SP);
    let (artifact, relay_state) = start(&env, "a-1").await?;
    assert!(relay_state.is_some());

    let mut request = ArtifactResolve::new(&partner.entity_id, artifact.as_str())
        .with_destination(env.url("/saml/artifact"));
    partner.signer.sign_message(&mut request, None)?;

    let response = resolve(&env, &request).await?;
    assert_eq!(response.status().as_u16(), 200);
    let body = response.text().await?;
    let answer = ArtifactResponse::from_xml(&SoapBinding::unwrap(&body)?)?;
    assert_eq!(answer.in_response_to, request.id);
    assert!(answer.status.is_success());
    assert!(answer.signature.is_some());
    let Some(ProtocolMessage::LogoutRequest(logout)) = answer.message else {
        anyhow::bail!("artifact did not carry a LogoutRequest");
    };
    assert_eq!(logout.name_id.value, "alice");
    assert_eq!(logout.issuer, env.state.config.server.entity_id);

    // The artifact is single use.
    let mut again = ArtifactResolve::new(&partner.entity_id, artifact.as_str())
        .with_destination(env.url("/saml/artifact"));
    partner.signer.sign_message(&mut again, None)?;
    let body = resolve(&env, &again).await?.text().await?;
    let answer = ArtifactResponse::from_xml(&SoapBinding::unwrap(&body)?)?;
    assert!(answer.message.is_none());

    // The partner answers through the POST binding.
    let mut logout_response = LogoutResponse::success(&partner.entity_id)
        .in_response_to(&logout.id)
        .with_destination(env.url("/saml/slo"));
    partner.signer.sign_message(&mut logout_response, None)?;
    let encoded = {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(logout_response.to_xml())
    };
    let mut form = vec![("SAMLResponse", encoded)];
    if let Some(relay_state) = relay_state {
        form.push(("RelayState", relay_state));
    }

    let response = env.client.post(env.url("/saml/slo")).form(&form).send().await?;
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await?.contains(r#"data-logout="full""#));
    assert_eq!(env.state.orchestrator.active_sagas(), 0);
    Ok(())
}

#[tokio::test]
async fn unsigned_artifact_resolve_is_a_fault() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let partner = env.partner(ARTIFACT_SP);
    let (artifact, _) = start(&env, "a-2").await?;

    let request = ArtifactResolve::new(&partner.entity_id, artifact.as_str())
        .with_destination(env.url("/saml/artifact"));
    let response = resolve(&env, &request).await?;

    assert_eq!(response.status().as_u16(), 500);
    assert!(response.text().await?.contains("soap:Fault"));
    Ok(())
}

#[tokio::test]
async fn artifact_resolve_from_unknown_partner_is_a_fault() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    let (artifact, _) = start(&env, "a-3").await?;

    let mut request = ArtifactResolve::new("https://stranger.sp.test", artifact.as_str())
        .with_destination(env.url("/saml/artifact"));
    env.partner(ARTIFACT_SP).signer.sign_message(&mut request, None)?;
    let response = resolve(&env, &request).await?;

    assert_eq!(response.status().as_u16(), 500);
    assert!(response.text().await?.contains("soap:Fault"));
    Ok(())
}
