use courier_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown conversation: {id}")]
    UnknownConversation { id: String },

    #[error(transparent)]
    InvalidEvent(#[from] courier_common::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_conversation(id: impl Into<String>) -> Self {
        Self::UnknownConversation { id: id.into() }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

courier_common::impl_context!();
