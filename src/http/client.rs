use async_trait::async_trait;

use crate::auction::types::{CellClient, CellState, Work};
use crate::error::{AuctioneerError, Result};
use crate::http::routes;

/// Reaches a cell's rep endpoint over HTTP with JSON payloads.
///
/// The underlying `reqwest::Client` carries the request timeout and is cheap
/// to clone, so one client is shared across every cell handle.
#[derive(Clone)]
pub struct HttpCellClient {
    http: reqwest::Client,
    address: String,
}

impl HttpCellClient {
    pub fn new(http: reqwest::Client, address: impl Into<String>) -> Self {
        Self {
            http,
            address: address.into(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.address, route)
    }
}

#[async_trait]
impl CellClient for HttpCellClient {
    async fn state(&self) -> Result<CellState> {
        let response = self.http.get(self.url(routes::STATE)).send().await?;
        if !response.status().is_success() {
            return Err(AuctioneerError::UnexpectedStatus {
                operation: "state",
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn perform(&self, work: Work) -> Result<Work> {
        let response = self
            .http
            .post(self.url(routes::PERFORM))
            .json(&work)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuctioneerError::UnexpectedStatus {
                operation: "perform",
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}
