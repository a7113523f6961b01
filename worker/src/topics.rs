//! The fixed set of topics the worker subscribes to.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A topic name outside [`KnownTopic::ALL`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown topic: {0}")]
pub struct UnknownTopic(pub String);

/// Topics with a notification handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownTopic {
    /// A user account was created
    UserCreated,
    /// An order was placed
    OrderCreated,
    /// Payment for an order went through
    OrderPaymentConfirmed,
    /// An order moved to a new status
    OrderStatusChanged,
    /// Product stock fell below its threshold
    StockLow,
    /// A client hit the API rate limit
    ApiRateLimited,
    /// A chaos experiment was injected
    ChaosInjected,
}

impl KnownTopic {
    /// Every known topic, in subscription order.
    pub const ALL: [Self; 7] = [
        Self::UserCreated,
        Self::OrderCreated,
        Self::OrderPaymentConfirmed,
        Self::OrderStatusChanged,
        Self::StockLow,
        Self::ApiRateLimited,
        Self::ChaosInjected,
    ];

    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserCreated => "user.created",
            Self::OrderCreated => "order.created",
            Self::OrderPaymentConfirmed => "order.payment_confirmed",
            Self::OrderStatusChanged => "order.status_changed",
            Self::StockLow => "stock.low",
            Self::ApiRateLimited => "api.rate_limited",
            Self::ChaosInjected => "chaos.injected",
        }
    }

    /// Wire names of [`ALL`](Self::ALL).
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|topic| topic.as_str()).collect()
    }
}

impl fmt::Display for KnownTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KnownTopic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}
