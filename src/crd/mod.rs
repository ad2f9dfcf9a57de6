pub mod alameda_recommendation;
pub mod alameda_scaler;
pub mod deployment_config;
pub mod shared;
