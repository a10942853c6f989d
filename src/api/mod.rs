// src/api/mod.rs

pub mod fee_delegation;
pub mod health;

use std::sync::Arc;

use crate::config::Config;
use crate::services::fee_delegation::FeeDelegationService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeeDelegationService>,
    pub config: Config,
}
