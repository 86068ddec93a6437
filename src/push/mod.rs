pub mod provider;
pub mod types;

pub use provider::{FcmProvider, MockProvider, PushProvider, SentNotification, FCM_BASE_URL};
pub use types::{
    MulticastSendResult, NotificationKind, NotificationPayload, PushPriority, SendResponse,
    DEFAULT_CHANNEL_ID,
};
