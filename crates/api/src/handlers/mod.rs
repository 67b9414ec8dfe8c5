pub mod health;
pub mod ingress;
pub mod metrics;
