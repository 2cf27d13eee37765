use crate::auction::AuctionStatus;
use reqwest::StatusCode;

// region:    --- Api Error

/// Transport and protocol failures talking to the marketplace API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Request failed with status {0}: {1}")]
    Status(StatusCode, String),
    #[error("Request rejected: {0}")]
    Rejected(String),
}

// endregion: --- Api Error

// region:    --- Bid Error

/// Why an auction that is not live refuses bids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    NotStarted,
    Ended,
    Sold,
}

impl InactiveReason {
    pub fn from_status(status: AuctionStatus) -> Option<Self> {
        match status {
            AuctionStatus::Upcoming => Some(InactiveReason::NotStarted),
            AuctionStatus::Ended => Some(InactiveReason::Ended),
            AuctionStatus::Sold => Some(InactiveReason::Sold),
            AuctionStatus::Live => None,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            InactiveReason::NotStarted => "المزاد لم يبدأ بعد",
            InactiveReason::Ended => "انتهى المزاد",
            InactiveReason::Sold => "تم بيع المركبة",
        }
    }
}

impl std::fmt::Display for InactiveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Outcome of a rejected bid. `Display` is the message shown next to the bid control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BidError {
    #[error("لا يمكنك المزايدة على مزادك الخاص")]
    OwnerCannotBid,
    #[error("المزاد غير نشط: {0}")]
    AuctionNotActive(InactiveReason),
    #[error("يجب تسجيل الدخول للمزايدة")]
    LoginRequired,
    #[error("يرجى إدخال مبلغ صحيح")]
    InvalidAmount,
    #[error("الحد الأدنى للمزايدة هو {minimum_bid} (زيادة لا تقل عن {min_increment})")]
    TooLow {
        minimum_bid: i64,
        min_increment: i64,
        /// Price implied by the server's correction, when it sent one.
        server_price: Option<i64>,
    },
    #[error("تم إلغاء المزايدة")]
    HighBidDeclined,
    #[error("جاري معالجة مزايدتك السابقة")]
    SubmissionPending,
    #[error("{0}")]
    Rejected(String),
    #[error("حدثت مشكلة في الاتصال، يرجى المحاولة مرة أخرى")]
    Network,
}

impl BidError {
    pub fn code(&self) -> &'static str {
        match self {
            BidError::OwnerCannotBid => "OWNER_CANNOT_BID",
            BidError::AuctionNotActive(_) => "AUCTION_NOT_ACTIVE",
            BidError::LoginRequired => "LOGIN_REQUIRED",
            BidError::InvalidAmount => "INVALID_AMOUNT",
            BidError::TooLow { .. } => "BID_TOO_LOW",
            BidError::HighBidDeclined => "HIGH_BID_DECLINED",
            BidError::SubmissionPending => "BID_PENDING",
            BidError::Rejected(_) => "BID_REJECTED",
            BidError::Network => "NETWORK_ERROR",
        }
    }

    /// Whether an inline error banner should be shown. Login prompts are handled by
    /// the host through its callback instead.
    pub fn is_displayed(&self) -> bool {
        !matches!(self, BidError::LoginRequired | BidError::SubmissionPending)
    }
}

// endregion: --- Bid Error

// region:    --- Sale Error

#[derive(Debug, thiserror::Error)]
pub enum SaleError {
    #[error("only the seller can accept a bid")]
    NotSeller,
    #[error("auction is already sold")]
    AlreadySold,
    #[error("sale confirmation cancelled")]
    Cancelled,
    #[error("accept-sale request failed: {0}")]
    RequestFailed(#[from] ApiError),
}

impl SaleError {
    pub fn code(&self) -> &'static str {
        match self {
            SaleError::NotSeller => "NOT_SELLER",
            SaleError::AlreadySold => "ALREADY_SOLD",
            SaleError::Cancelled => "CANCELLED",
            SaleError::RequestFailed(_) => "REQUEST_FAILED",
        }
    }
}

// endregion: --- Sale Error
