//! `reqwest` implementation of the REST contract

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use url::Url;

use crate::error::{DispatchError, Result};
use crate::store::CredentialStore;
use crate::types::identifiers::{GuardId, ReportId};
use crate::types::session::{ActiveIntervention, TokenPair};

use super::{DispatchApi, TokenResponse, endpoints, parse_active_intervention};

/// HTTP client for the dispatch server's REST side
///
/// Requests carry `Authorization: Bearer <access token>` whenever the store
/// holds one.
#[derive(Clone)]
pub struct HttpDispatchApi {
    http: Client,
    base_url: Url,
    store: Arc<dyn CredentialStore>,
}

impl HttpDispatchApi {
    /// Create a client for `base_url`
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the HTTP client cannot be built
    pub fn new(base_url: Url, store: Arc<dyn CredentialStore>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::invalid_config(format!("HTTP client: {e}")))?;

        // Url::join drops the last segment unless the base ends with a slash
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            let mut url = base_url;
            let path = format!("{}/", url.path());
            url.set_path(&path);
            url
        };

        Ok(Self {
            http,
            base_url,
            store,
        })
    }

    fn post(&self, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        let request = self.http.post(url);
        Ok(match self.store.access_token()? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn checked(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::api_status(
                format!("unexpected status: {status} body={body}"),
                status.as_u16(),
            ))
        }
    }
}

#[async_trait]
impl DispatchApi for HttpDispatchApi {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String> {
        let response = self
            .post(endpoints::REFRESH_ACCESS)?
            .json(&refresh_token)
            .send()
            .await?;
        let body: TokenResponse = Self::checked(response).await?.json().await?;
        body.into_access_token()
    }

    async fn refresh_both_tokens(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .post(endpoints::REFRESH_BOTH)?
            .json(&refresh_token)
            .send()
            .await?;
        let body: TokenResponse = Self::checked(response).await?.json().await?;
        body.into_pair()
    }

    async fn is_report_active(&self, report_id: ReportId) -> Result<bool> {
        let response = self
            .post(endpoints::IS_REPORT_ACTIVE)?
            .form(&[("reportId", report_id.get())])
            .send()
            .await?;
        let text = Self::checked(response).await?.text().await?;
        debug!("isReportActive({report_id}) -> {text}");
        match text.trim() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(DispatchError::api(format!(
                "isReportActive answered {other:?}"
            ))),
        }
    }

    async fn active_intervention(&self, guard_id: GuardId) -> Result<Option<ActiveIntervention>> {
        let response = self
            .post(endpoints::ACTIVE_INTERVENTION)?
            .form(&[("guardId", guard_id.get())])
            .send()
            .await?;
        let text = Self::checked(response).await?.text().await?;
        parse_active_intervention(&text)
    }
}
