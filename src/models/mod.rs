// src/models/mod.rs
pub mod delegation;

// Re-export request/response types so handlers can use `crate::models::X`
pub use delegation::{
    ApiResponse,
    DelegateBody,
    DelegateResponse,
    DelegationRequest,
    DelegationStatus,
    PrepareResponse,
};
