pub mod chat;
pub mod codec;
pub mod conversation;
pub mod events;
pub mod history;
pub mod image;
