// Application Layer - State synchronization engine

pub mod broker;
pub mod constants;
pub mod event_bus;
pub mod multivisor;
pub mod poller;
pub mod process_tracker;
pub mod supervisor_tracker;

// Re-exports
pub use broker::{encode_frame, Frame, SubscriberBroker, Subscription};
pub use event_bus::EventBus;
pub use multivisor::Multivisor;
pub use poller::{refresh_all, Poller, PollerHandle};
pub use process_tracker::ProcessTracker;
pub use supervisor_tracker::SupervisorTracker;
