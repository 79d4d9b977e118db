pub mod message;
pub mod payload;
pub mod presence;
pub mod upstream;

pub use message::{
    AttachmentInfo, EmbedFieldInfo, EmbedInfo, EmbedMediaInfo, EmojiInfo, NormalizedMessage,
    ReactionInfo, ReactionUser, RepliedTo,
};
pub use payload::{ServerPayload, SubscribeRequest};
pub use presence::{ChannelInfo, PresenceEntry, PresenceStatus, PresenceUser};
