// All service modules
pub mod chain_rpc;
pub mod fee_delegation;
pub mod nonce_manager;
pub mod relayer;
pub mod validation;

#[cfg(test)]
pub mod mock_node;

// Re-export for convenience
pub use fee_delegation::FeeDelegationService;
