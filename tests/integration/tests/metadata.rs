//! IdP metadata endpoint.

use crate::common::{TestEnv, IDP};

#[tokio::test]
async fn metadata_publishes_logout_and_artifact_endpoints() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(env.url("/saml/metadata")).send().await?;
    assert!(response.status().is_success());

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert_eq!(content_type, "application/samlmetadata+xml");

    let body = response.text().await?;
    assert!(body.contains(&format!(r#"entityID="{IDP}""#)));
    assert!(body.contains("IDPSSODescriptor"));
    assert!(body.contains("X509Certificate"));
    assert!(body.contains(&format!(r#"Location="{}""#, env.url("/saml/slo"))));
    assert!(body.contains(&format!(r#"Location="{}""#, env.url("/saml/slo/soap"))));
    assert!(body.contains(&format!(r#"Location="{}""#, env.url("/saml/artifact"))));
    assert!(body.contains("urn:oasis:names:tc:SAML:2.0:bindings:SOAP"));

    Ok(())
}
