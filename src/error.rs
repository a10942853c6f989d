use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad request input. Raised before any RPC call or signing.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transaction fields: {0}")]
    InvalidTransactionFields(String),

    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    #[error("Invalid signature: recovered {recovered}, expected {expected}")]
    InvalidSignature { expected: String, recovered: String },

    #[error("Sender signature does not match {expected} (recovered {recovered})")]
    SignatureMismatch { expected: String, recovered: String },

    /// The node refused the broadcast. The message is the node's own.
    #[error("Transaction rejected by node: {0}")]
    Relay(String),

    /// The broadcast request failed in transit. The node may or may not hold
    /// the transaction.
    #[error("Broadcast outcome unknown: {0}")]
    BroadcastUnknown(String),

    /// No receipt within the wait window. The transaction may still confirm.
    #[error("Receipt for {tx_hash} not available after {waited_secs}s")]
    ReceiptTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Blockchain RPC error: {0}")]
    BlockchainRPC(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::InvalidTransactionFields(_) => "INVALID_TRANSACTION_FIELDS",
            AppError::MalformedSignature(_) => "MALFORMED_SIGNATURE",
            AppError::InvalidSignature { .. } => "INVALID_SIGNATURE",
            AppError::SignatureMismatch { .. } => "SIGNATURE_MISMATCH",
            AppError::Relay(_) => "TRANSACTION_REJECTED",
            AppError::BroadcastUnknown(_) => "BROADCAST_OUTCOME_UNKNOWN",
            AppError::ReceiptTimeout { .. } => "RECEIPT_TIMEOUT",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::BlockchainRPC(_) => "BLOCKCHAIN_RPC_ERROR",
            AppError::Encoding(_) => "ENCODING_ERROR",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::InvalidTransactionFields(_)
            | AppError::MalformedSignature(_)
            | AppError::InvalidSignature { .. }
            | AppError::SignatureMismatch { .. }
            | AppError::Encoding(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Relay(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ReceiptTimeout { .. } => StatusCode::ACCEPTED,
            AppError::BlockchainRPC(_) => StatusCode::BAD_GATEWAY,
            AppError::BroadcastUnknown(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            AppError::ReceiptTimeout { tx_hash, .. } => {
                Some(serde_json::json!({ "tx_hash": tx_hash, "outcome": "pending" }))
            }
            _ => None,
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                details,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_keeps_node_message() {
        let err = AppError::Relay("nonce too low".to_string());
        assert!(err.to_string().contains("nonce too low"));
        assert_eq!(err.code(), "TRANSACTION_REJECTED");
    }

    #[test]
    fn timeout_is_not_reported_as_failure_status() {
        let err = AppError::ReceiptTimeout {
            tx_hash: "0xabc".to_string(),
            waited_secs: 300,
        };
        assert_eq!(err.status(), StatusCode::ACCEPTED);
        assert_eq!(
            AppError::Validation("gas".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_broadcast_is_distinct_from_rejection() {
        let err = AppError::BroadcastUnknown("connection reset".into());
        assert_eq!(err.code(), "BROADCAST_OUTCOME_UNKNOWN");
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_ne!(err.status(), AppError::Relay("x".into()).status());
    }
}
