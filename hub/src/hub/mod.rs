mod hub;
pub use hub::Hub;

mod hub_config;
pub use hub_config::HubConfig;

mod health;
pub use health::{HealthSnapshot, NodeRow};
