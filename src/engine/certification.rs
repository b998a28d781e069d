//! Certificate and badge issuance for course and plan completions.
//!
//! The issuer claims the completion row with a conditional update, renders,
//! then stores the URL under that same claim. A failed render releases the
//! claim so a later cascade can retry. A claim left behind by a process that
//! died mid-render expires after the claim lease and is taken over.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::error::EngineError;
use crate::metrics::MetricsCollector;
use crate::model::{AwardFlags, Completion, CompletionLevel};
use crate::storage::Database;

#[derive(Debug, Error)]
#[error("Certificate rendering failed: {0}")]
pub struct RenderError(pub String);

/// Produces a certificate artifact for a completion.
#[async_trait]
pub trait CertificateRenderer: Send + Sync {
    /// Returns the URL of the rendered certificate.
    async fn render(&self, completion: &Completion) -> Result<String, RenderError>;
}

/// Renderer that addresses certificates by completion ID under a base URL.
#[derive(Debug, Clone)]
pub struct UrlCertificateRenderer {
    base_url: String,
}

impl UrlCertificateRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CertificateRenderer for UrlCertificateRenderer {
    async fn render(&self, completion: &Completion) -> Result<String, RenderError> {
        Ok(format!("{}/certificates/{}", self.base_url, completion.id))
    }
}

/// What one `issue` call newly awarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedAwards {
    pub completion_id: String,
    pub level: Option<CompletionLevel>,
    pub certificate_url: Option<String>,
    pub badge_awarded: bool,
}

impl IssuedAwards {
    pub fn is_empty(&self) -> bool {
        self.certificate_url.is_none() && !self.badge_awarded
    }
}

/// How long a certificate claim blocks other issuers.
pub const CERTIFICATE_CLAIM_LEASE_SECS: i64 = 300;

pub struct CertificationIssuer {
    db: Database,
    renderer: Arc<dyn CertificateRenderer>,
    metrics: MetricsCollector,
    claim_lease: Duration,
}

impl CertificationIssuer {
    pub fn new(db: Database, renderer: Arc<dyn CertificateRenderer>) -> Self {
        Self {
            db,
            renderer,
            metrics: MetricsCollector::new(),
            claim_lease: Duration::seconds(CERTIFICATE_CLAIM_LEASE_SECS),
        }
    }

    pub fn with_claim_lease(mut self, lease: Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Stamps the completion with whatever `flags` enable and it still lacks.
    ///
    /// Safe to call any number of times; only the first successful call per
    /// artifact reports it as issued.
    pub async fn issue(&self, completion: &Completion, flags: AwardFlags) -> Result<IssuedAwards, EngineError> {
        let level = completion.level();
        let mut issued = IssuedAwards {
            completion_id: completion.id.clone(),
            level: Some(level),
            ..Default::default()
        };

        if flags.certificate && completion.certificate_url.is_none() {
            issued.certificate_url = self.issue_certificate(completion).await?;
        }

        if flags.badge && !completion.badge_awarded && self.db.award_badge(&completion.id, Utc::now()).await? {
            issued.badge_awarded = true;
            self.metrics.record_award(level, "badge");
            tracing::info!(
                completion_id = %completion.id,
                user_id = %completion.user_id,
                level = level.as_str(),
                "Badge awarded"
            );
        }

        Ok(issued)
    }

    async fn issue_certificate(&self, completion: &Completion) -> Result<Option<String>, EngineError> {
        let level = completion.level();
        let claimed_at = Utc::now();
        if !self
            .db
            .claim_certificate(&completion.id, claimed_at, claimed_at - self.claim_lease)
            .await?
        {
            tracing::debug!(completion_id = %completion.id, "Certificate already claimed");
            return Ok(None);
        }

        let url = match self.renderer.render(completion).await {
            Ok(url) => url,
            Err(e) => {
                self.db.release_certificate_claim(&completion.id, claimed_at).await?;
                tracing::error!(completion_id = %completion.id, error = %e, "Certificate rendering failed");
                return Err(EngineError::Internal(e.to_string()));
            }
        };

        if !self
            .db
            .store_certificate_url(&completion.id, &url, claimed_at, Utc::now())
            .await?
        {
            tracing::warn!(completion_id = %completion.id, "Certificate claim expired before the URL was stored");
            return Ok(None);
        }
        self.metrics.record_award(level, "certificate");
        tracing::info!(
            completion_id = %completion.id,
            user_id = %completion.user_id,
            level = level.as_str(),
            url = %url,
            "Certificate issued"
        );
        Ok(Some(url))
    }
}
