// =============================================================================
// Notify Module
// =============================================================================
//
// Push-style notification delivery:
// - Provider endpoints (URL templates, credential kinds, payload encoding)
// - Dispatcher (independent per-provider retries, delivery outcomes)

pub mod dispatcher;
pub mod provider;

pub use dispatcher::{delivered_any, DeliveryOutcome, NotificationDispatcher};
pub use provider::ProviderEndpoint;
