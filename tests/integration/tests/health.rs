//! Health and server information endpoints.

use crate::common::{TestEnv, IDP};

#[tokio::test]
async fn health_reports_healthy() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(env.url("/health")).send().await?;
    assert!(response.status().is_success());
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], "healthy");

    let ready = env.client.get(env.url("/health/ready")).send().await?;
    assert_eq!(ready.status().as_u16(), 200);

    Ok(())
}

/// An adapter of an unknown kind is dropped; the server still starts and
/// reports its partners and assurance levels.
#[tokio::test]
async fn server_info_lists_partners_and_levels() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let body: serde_json::Value = env.client.get(env.url("/")).send().await?.json().await?;

    assert_eq!(body["entity_id"], IDP);
    assert_eq!(body["partners"], 4);
    assert_eq!(body["active_logouts"], 0);
    let levels = body["assurance_levels"].as_array().cloned().unwrap_or_default();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0]["level"], 10);
    assert_eq!(levels[1]["level"], 20);
    assert_eq!(body["adapters"].as_array().map(Vec::len), Some(0));

    Ok(())
}
