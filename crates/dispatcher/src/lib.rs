pub mod contract_store;
pub mod contract_watcher;
pub mod controller;
pub mod delivery_client;
pub mod dispatcher;
pub mod retry_policy;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use contract_store::ContractStore;
pub use contract_watcher::{ContractFile, ContractWatcher};
pub use controller::DispatcherController;
pub use delivery_client::{DeliveryClient, DeliveryOutcome, HttpDeliveryClient};
pub use dispatcher::{ChannelDispatcher, DispatchOutcome, Interrupted};
pub use retry_policy::RetryDecision;
