use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::alternatives::AlternativeCandidate;
use crate::coverage::{CoverageDecision, InsuranceProfile};
use crate::interactions::InteractionFinding;
use crate::medication::MedicationEntry;
use crate::sources::{CoverageSource, DrugCatalog, DrugSummary, InteractionSource, LookupError};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;
const ERROR_PREVIEW_CHARS: usize = 180;

/// Remote knowledge service speaking plain JSON over GET.
#[derive(Debug, Clone)]
pub struct HttpKnowledgeSource {
    client: Client,
    base_url: String,
}

impl HttpKnowledgeSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("rx-advisor/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS).min(timeout))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Ok(None)` on 404; other non-success statuses are `Unavailable`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, LookupError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|error| transport_error(&url, error))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("GET {url} returned 404");
            return Ok(None);
        }
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(&url, error))?;
        if !status.is_success() {
            let preview: String = body.chars().take(ERROR_PREVIEW_CHARS).collect();
            return Err(LookupError::Unavailable(format!(
                "GET {url} returned {status}: {preview}"
            )));
        }
        serde_json::from_str::<Option<T>>(&body)
            .map_err(|error| LookupError::Unavailable(format!("invalid JSON from {url}: {error}")))
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> LookupError {
    if error.is_timeout() {
        LookupError::Timeout
    } else {
        LookupError::Unavailable(format!("GET {url} failed: {error}"))
    }
}

#[async_trait]
impl DrugCatalog for HttpKnowledgeSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn alternatives_for(
        &self,
        medication: &MedicationEntry,
    ) -> Result<Vec<AlternativeCandidate>, LookupError> {
        let found: Option<Vec<AlternativeCandidate>> = self
            .get_json("/alternatives", &[("name", medication.name.trim().to_string())])
            .await?;
        Ok(found.unwrap_or_default())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<DrugSummary>, LookupError> {
        let found: Option<Vec<DrugSummary>> = self
            .get_json(
                "/search",
                &[("q", query.trim().to_string()), ("limit", limit.to_string())],
            )
            .await?;
        let mut hits = found.unwrap_or_default();
        hits.truncate(limit);
        Ok(hits)
    }
}

#[async_trait]
impl InteractionSource for HttpKnowledgeSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn interaction_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<InteractionFinding>, LookupError> {
        self.get_json(
            "/interactions",
            &[("a", a.trim().to_string()), ("b", b.trim().to_string())],
        )
        .await
    }
}

#[async_trait]
impl CoverageSource for HttpKnowledgeSource {
    fn name(&self) -> &str {
        "http"
    }

    /// A 404 from the payer means the drug is not on the formulary.
    async fn coverage_for(
        &self,
        insurance: &InsuranceProfile,
        medication: &MedicationEntry,
    ) -> Result<CoverageDecision, LookupError> {
        let found: Option<CoverageDecision> = self
            .get_json(
                "/coverage",
                &[
                    ("provider", insurance.provider.clone()),
                    ("policy_id", insurance.policy_id.clone()),
                    ("name", medication.name.trim().to_string()),
                    ("price", medication.price.to_string()),
                ],
            )
            .await?;
        Ok(found.unwrap_or_else(CoverageDecision::not_covered))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::net::TcpListener;

    use super::*;
    use crate::sources::static_source::StaticKnowledge;

    type Params = Query<HashMap<String, String>>;

    async fn alternatives(
        State(kb): State<Arc<StaticKnowledge>>,
        Query(q): Params,
    ) -> impl IntoResponse {
        let name = q.get("name").cloned().unwrap_or_default();
        let found = kb
            .alternatives_for(&MedicationEntry::new(&name, Decimal::ZERO))
            .await
            .unwrap_or_default();
        if found.is_empty() {
            AxumStatus::NOT_FOUND.into_response()
        } else {
            Json(found).into_response()
        }
    }

    async fn interactions(
        State(kb): State<Arc<StaticKnowledge>>,
        Query(q): Params,
    ) -> impl IntoResponse {
        let a = q.get("a").cloned().unwrap_or_default();
        let b = q.get("b").cloned().unwrap_or_default();
        Json(kb.interaction_between(&a, &b).await.ok().flatten())
    }

    async fn coverage(
        State(kb): State<Arc<StaticKnowledge>>,
        Query(q): Params,
    ) -> impl IntoResponse {
        if q.get("provider").map(String::as_str) == Some("down") {
            return (AxumStatus::SERVICE_UNAVAILABLE, "payer offline").into_response();
        }
        let name = q.get("name").cloned().unwrap_or_default();
        let price = q
            .get("price")
            .and_then(|p| p.parse::<Decimal>().ok())
            .unwrap_or_default();
        let decision = kb
            .coverage_for(&InsuranceProfile::default(), &MedicationEntry::new(&name, price))
            .await
            .unwrap_or_default();
        Json(decision).into_response()
    }

    async fn search(
        State(kb): State<Arc<StaticKnowledge>>,
        Query(q): Params,
    ) -> impl IntoResponse {
        let query = q.get("q").cloned().unwrap_or_default();
        let limit = q.get("limit").and_then(|l| l.parse().ok()).unwrap_or(10);
        Json(kb.search(&query, limit).await.unwrap_or_default())
    }

    async fn wild_scores() -> impl IntoResponse {
        Json(serde_json::json!([
            {"name": "Dolo", "price": 35, "similarity_score": 300},
            {"name": "Crocin", "price": 50, "similarity_score": -5}
        ]))
    }

    async fn slow() -> impl IntoResponse {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(Vec::<AlternativeCandidate>::new())
    }

    async fn spawn_service() -> String {
        let app = Router::new()
            .route("/alternatives", get(alternatives))
            .route("/interactions", get(interactions))
            .route("/coverage", get(coverage))
            .route("/search", get(search))
            .route("/slow/alternatives", get(slow))
            .route("/wild/alternatives", get(wild_scores))
            .with_state(StaticKnowledge::seeded());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn source(base: &str) -> HttpKnowledgeSource {
        HttpKnowledgeSource::new(base, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn fetches_alternatives_and_treats_404_as_unknown() {
        let base = spawn_service().await;
        let http = source(&format!("{base}/"));
        assert_eq!(http.base_url(), base);

        let found = http
            .alternatives_for(&MedicationEntry::new("Paracetamol", dec!(40)))
            .await
            .unwrap();
        assert!(found.iter().any(|c| c.name == "Dolo" && c.coverage));

        let unknown = http
            .alternatives_for(&MedicationEntry::new("Unobtainium", dec!(40)))
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped_not_rejected() {
        let base = spawn_service().await;
        let found = source(&format!("{base}/wild"))
            .alternatives_for(&MedicationEntry::new("Paracetamol", dec!(40)))
            .await
            .unwrap();
        let scores = found
            .iter()
            .map(|c| (c.name.as_str(), c.similarity_score))
            .collect::<Vec<_>>();
        assert_eq!(scores, vec![("Dolo", 100), ("Crocin", 0)]);
    }

    #[tokio::test]
    async fn null_interaction_is_none() {
        let http = source(&spawn_service().await);
        let found = http.interaction_between("Warfarin", "Aspirin").await.unwrap();
        assert_eq!(found.unwrap().severity, crate::interactions::Severity::High);
        assert!(http
            .interaction_between("Metformin", "Aspirin")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn coverage_outage_is_unavailable() {
        let http = source(&spawn_service().await);
        let decision = http
            .coverage_for(
                &InsuranceProfile::connected("Acme", "P-1", "Gold"),
                &MedicationEntry::new("Lipitor", dec!(250)),
            )
            .await
            .unwrap();
        assert_eq!(decision.covered_amount, dec!(220));

        let err = http
            .coverage_for(
                &InsuranceProfile::connected("down", "P-1", "Gold"),
                &MedicationEntry::new("Lipitor", dec!(250)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(reason) if reason.contains("503")));
    }

    #[tokio::test]
    async fn search_passes_limit() {
        let http = source(&spawn_service().await);
        let hits = http.search("statin", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "Atorvastatin");
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let base = spawn_service().await;
        let http =
            HttpKnowledgeSource::new(&format!("{base}/slow"), Duration::from_millis(100)).unwrap();
        let err = http
            .alternatives_for(&MedicationEntry::new("Paracetamol", dec!(40)))
            .await
            .unwrap_err();
        assert_eq!(err, LookupError::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = source(&format!("http://{addr}"))
            .search("dolo", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable(_)));
    }
}
