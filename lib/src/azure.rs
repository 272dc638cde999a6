// Copyright 2024 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Blocking client for the Azure Repos refs API.

#![allow(missing_docs)]

use std::io::Read as _;

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::ref_service::{RefService, RefServiceError, RefUpdate, RefUpdateResult, RemoteRef};
use crate::settings::AzureSettings;

const USER_AGENT: &str = concat!("refmirror/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum AzureConfigError {
    #[error("Missing required setting `azure.{0}`")]
    MissingSetting(&'static str),
    #[error("Invalid organization URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: Option<url::ParseError>,
    },
}

/// Envelope the service wraps every collection in.
#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug)]
pub struct AzureReposClient {
    agent: ureq::Agent,
    organization_url: Url,
    project: String,
    api_version: String,
    authorization: Option<String>,
}

impl AzureReposClient {
    pub fn from_settings(settings: &AzureSettings) -> Result<Self, AzureConfigError> {
        let url_str = settings
            .organization_url
            .as_deref()
            .ok_or(AzureConfigError::MissingSetting("organization-url"))?;
        let project = settings
            .project
            .as_deref()
            .ok_or(AzureConfigError::MissingSetting("project"))?;
        let organization_url = Url::parse(url_str).map_err(|err| AzureConfigError::InvalidUrl {
            url: url_str.to_owned(),
            source: Some(err),
        })?;
        if organization_url.cannot_be_a_base() {
            return Err(AzureConfigError::InvalidUrl {
                url: url_str.to_owned(),
                source: None,
            });
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(settings.timeout())
            .build();
        Ok(AzureReposClient {
            agent,
            organization_url,
            project: project.to_owned(),
            api_version: settings.api_version.clone(),
            authorization: settings.token.as_deref().map(basic_authorization),
        })
    }

    /// `<org>/<project>/_apis/git/repositories/<repository>/refs?api-version=..`
    pub fn refs_url(&self, repository: &str, filter: Option<&str>) -> Result<Url, RefServiceError> {
        let mut url = self.organization_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RefServiceError::Transport(format!(
                    "organization URL {} cannot be a base",
                    self.organization_url
                ))
            })?
            .pop_if_empty()
            .push(&self.project)
            .extend(["_apis", "git", "repositories", repository, "refs"]);
        {
            let mut query = url.query_pairs_mut();
            if let Some(filter) = filter {
                query.append_pair("filter", filter);
            }
            query.append_pair("api-version", &self.api_version);
        }
        Ok(url)
    }

    fn request(&self, method: &str, url: &Url) -> ureq::Request {
        let request = self
            .agent
            .request_url(method, url)
            .set("User-Agent", USER_AGENT)
            .set("Accept", "application/json");
        match &self.authorization {
            Some(value) => request.set("Authorization", value),
            None => request,
        }
    }
}

impl RefService for AzureReposClient {
    #[instrument(skip(self))]
    fn list_refs(&self, repository: &str, filter: &str) -> Result<Vec<RemoteRef>, RefServiceError> {
        let url = self.refs_url(repository, Some(filter))?;
        let body = read_success_body(self.request("GET", &url).call())?;
        let list: ValueList<RemoteRef> = parse_json(&body)?;
        tracing::debug!(count = list.value.len(), "listed remote refs");
        Ok(list.value)
    }

    #[instrument(skip(self, updates))]
    fn update_refs(
        &self,
        repository: &str,
        updates: &[RefUpdate],
    ) -> Result<Vec<RefUpdateResult>, RefServiceError> {
        let url = self.refs_url(repository, None)?;
        let body = read_success_body(self.request("POST", &url).send_json(updates))?;
        let list: ValueList<RefUpdateResult> = parse_json(&body)?;
        Ok(list.value)
    }
}

/// Personal access tokens go in as the password of an empty user name.
pub fn basic_authorization(token: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!(":{token}"));
    format!("Basic {encoded}")
}

fn read_body(response: ureq::Response) -> Result<String, RefServiceError> {
    let mut body = String::new();
    response
        .into_reader()
        .read_to_string(&mut body)
        .map_err(|err| RefServiceError::Transport(format!("failed to read response: {err}")))?;
    Ok(body)
}

/// Only 200 and 201 count as success; everything else carries the body for
/// diagnostics.
fn read_success_body(
    result: Result<ureq::Response, ureq::Error>,
) -> Result<String, RefServiceError> {
    match result {
        Ok(response) => {
            let status = response.status();
            let body = read_body(response)?;
            if status == 200 || status == 201 {
                Ok(body)
            } else {
                Err(RefServiceError::Status { status, body })
            }
        }
        Err(ureq::Error::Status(status, response)) => {
            let body = read_body(response).unwrap_or_default();
            Err(RefServiceError::Status { status, body })
        }
        Err(ureq::Error::Transport(err)) => Err(RefServiceError::Transport(err.to_string())),
    }
}

fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, RefServiceError> {
    serde_json::from_str(body).map_err(|err| RefServiceError::InvalidResponse(err.to_string()))
}
