use actix_web::{HttpResponse, post, web};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TestSiteRequest {
    pub url: String,
}

/// Run the deep analyzer against a URL and return its report.
#[post("/api/test-site")]
pub async fn test_site_route(body: web::Json<TestSiteRequest>) -> Result<HttpResponse, ApiError> {
    let url = body.into_inner().url;
    sitescan::validate_target(&url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;

    tracing::debug!(url = %url, "Ad-hoc site test requested");
    let report = sitescan::test_url(&url).await;

    Ok(HttpResponse::Ok().json(report))
}
