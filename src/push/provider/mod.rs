pub mod fcm;
pub mod mock;
pub mod provider_trait;

pub use fcm::{FcmProvider, FCM_BASE_URL};
pub use mock::{MockProvider, SentNotification};
pub use provider_trait::PushProvider;
