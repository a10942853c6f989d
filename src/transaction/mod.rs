//! Fee-delegated typed transactions: field layouts, canonical encoding and
//! the signing state machine.

pub mod encoding;
pub mod state;
pub mod types;
