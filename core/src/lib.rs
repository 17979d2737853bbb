//! crm-core: churn-risk scoring, aggregate analytics and storage for the CRM.

pub mod analytics;
pub mod churn_score;
pub mod config;
pub mod entity;
pub mod error;
pub mod pipeline;
pub mod rng;
pub mod store;
pub mod types;
