//! 文档模型
//!
//! 这些实体由 App 写入 Firestore，本服务只读，不拥有任何持久化状态。

pub mod friend;
pub mod pingtrail;
pub mod user;

pub use friend::{FriendRequest, FriendRequestStatus};
pub use pingtrail::PingTrail;
pub use user::{UserProfile, UNKNOWN_USER_NAME};

/// Firestore 集合名
pub const USERS_COLLECTION: &str = "users";
pub const FRIEND_REQUESTS_COLLECTION: &str = "friend_requests";
pub const PINGTRAILS_COLLECTION: &str = "pingtrails";

