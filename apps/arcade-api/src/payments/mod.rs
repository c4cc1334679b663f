//! Payment sessions: item purchase, provider verification and points credit.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod provider;
pub mod status;
pub mod store;

pub use coordinator::{Confirmation, PaymentCoordinator, WebhookEvent, WebhookOutcome};
pub use error::{PaymentError, ProviderError, StoreError};
pub use provider::{PaymentProvider, PortOneClient, ProviderPayment, ProviderStatus};
pub use status::PaymentStatus;
pub use store::{Finalized, PaymentStore, PgPaymentStore};
