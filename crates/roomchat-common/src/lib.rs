pub mod errors;
pub mod events;
pub mod id;
pub mod types;

pub use errors::{ChatError, ConfigError};
pub use events::{ClientEvent, EventBus};
pub use id::new_correlation_id;
pub use types::{ChatRoom, ConnectionState, Credential, Message, RoomId, BOT_USER_NAME};
