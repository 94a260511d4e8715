//! Message schemas bound to topics.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::names::{self, TopicName};

/// A payload type carried by exactly one topic.
///
/// The topic binding is static: `Topic<M>` reads `M::TOPIC`, so a handler
/// registered on a topic always receives the schema that topic was declared with.
pub trait Message: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Topic this schema is published on.
    const TOPIC: TopicName;

    /// Schema-level checks applied after JSON decoding succeeds.
    fn validate(&self) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Decode one broker payload.
    fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let message: Self = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    /// Encode for publishing. Invalid messages are refused.
    fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }
}

/// A transfer above the high-value threshold, as reported by the payments domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsHighValueTransferMessage {
    pub payment_id: String,
    pub from_account: String,
    pub to_account: String,
    /// Minor currency units.
    pub amount: i64,
    /// ISO 4217 code.
    pub currency: String,
}

impl Message for PaymentsHighValueTransferMessage {
    const TOPIC: TopicName = names::PAYMENTS_HIGH_VALUE_TRANSFER_V1;

    fn validate(&self) -> Result<(), DecodeError> {
        if self.payment_id.is_empty() {
            return Err(DecodeError::Invalid("payment_id is empty".into()));
        }
        if self.amount <= 0 {
            return Err(DecodeError::Invalid(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DecodeError::Invalid(format!(
                "currency '{}' is not an ISO 4217 code",
                self.currency
            )));
        }
        Ok(())
    }
}
