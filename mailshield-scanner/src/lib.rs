pub mod client;
pub mod error;
pub mod result;

pub use client::{HttpRiskClient, RiskScorer};
pub use error::ScanFailure;
pub use result::{RiskLevel, ScanResult};
