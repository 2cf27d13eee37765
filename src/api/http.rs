// region:    --- Imports
use super::{
    classify_bid_response, AcceptSaleRequest, AuctionApi, BidResponse, Envelope, EventSource,
    FrameStream, PlaceBidRequest,
};
use crate::auction::Auction;
use crate::bidding::model::BidRecord;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::live::sse::{SseDecoder, SseFrame};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Http Auction Api

/// reqwest-backed implementation of [`AuctionApi`] and [`EventSource`].
#[derive(Clone)]
pub struct HttpAuctionApi {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpAuctionApi {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Sends `builder` and unwraps the `data` field of a successful envelope.
    async fn fetch_data<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status(status, error_message(&body)));
        }

        let envelope: Envelope<T> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope
                    .message
                    .or(envelope.error)
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::Rejected("response carried no data".to_string()))
    }
}

/// Best-effort human message from an error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[async_trait]
impl AuctionApi for HttpAuctionApi {
    async fn fetch_auction(&self, auction_id: &str) -> Result<Auction, ApiError> {
        debug!("{:<12} --> fetch auction id: {}", "Api", auction_id);
        self.fetch_data(self.request(Method::GET, &format!("/auctions/{auction_id}")))
            .await
    }

    async fn fetch_bids(&self, auction_id: &str) -> Result<Vec<BidRecord>, ApiError> {
        debug!("{:<12} --> fetch bid history id: {}", "Api", auction_id);
        self.fetch_data(self.request(Method::GET, &format!("/auctions/{auction_id}/bid")))
            .await
    }

    async fn place_bid(
        &self,
        auction_id: &str,
        request: &PlaceBidRequest,
    ) -> Result<BidResponse, ApiError> {
        info!(
            "{:<12} --> place bid id: {}, amount: {}, confirm: {:?}",
            "Api", auction_id, request.amount, request.confirm_high_bid
        );
        let response = self
            .request(Method::POST, &format!("/auctions/{auction_id}/bid"))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
        Ok(classify_bid_response(status.as_u16(), &body))
    }

    async fn accept_sale(
        &self,
        auction_id: &str,
        request: &AcceptSaleRequest,
    ) -> Result<String, ApiError> {
        info!(
            "{:<12} --> accept sale id: {}, bidder: {}, amount: {}",
            "Api", auction_id, request.bidder_id, request.amount
        );
        let response = self
            .request(Method::POST, &format!("/auctions/{auction_id}/accept-sale"))
            .json(request)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status(status, error_message(&body)));
        }
        let envelope: Envelope<Value> = serde_json::from_str(&body)?;
        if !envelope.success {
            return Err(ApiError::Rejected(
                envelope
                    .message
                    .or(envelope.error)
                    .unwrap_or_else(|| "sale was not accepted".to_string()),
            ));
        }
        Ok(envelope.message.unwrap_or_default())
    }
}

#[async_trait]
impl EventSource for HttpAuctionApi {
    async fn connect(&self, auction_ids: &str) -> Result<FrameStream, ApiError> {
        let response = self
            .request(Method::GET, "/auctions/stream")
            .query(&[("ids", auction_ids)])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "{:<12} --> event stream refused: status={}",
                "Api", status
            );
            return Err(ApiError::Status(status, "event stream refused".to_string()));
        }

        let mut decoder = SseDecoder::new();
        let frames = response.bytes_stream().flat_map(move |chunk| {
            let items: Vec<Result<SseFrame, ApiError>> = match chunk {
                Ok(bytes) => decoder.feed(&bytes).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(ApiError::from(e))],
            };
            futures::stream::iter(items)
        });
        Ok(Box::pin(frames))
    }
}

// endregion: --- Http Auction Api
