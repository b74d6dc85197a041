use crate::api::models::ModelDescriptor;
use crate::core::session::StoreError;
use crate::core::stream_parser::PullProgress;
use crate::core::transport::TransportError;

/// Result message posted by a worker task to the control loop.
#[derive(Debug)]
pub enum WorkerEvent {
    Connectivity(bool),
    ModelsListed(Result<Vec<ModelDescriptor>, TransportError>),
    PullProgress {
        name: String,
        progress: PullProgress,
    },
    PullFinished {
        name: String,
        result: Result<bool, TransportError>,
    },
    Deleted {
        name: String,
        result: Result<bool, TransportError>,
    },
    ChatChunk {
        exchange: u64,
        text: String,
    },
    ChatFinished {
        exchange: u64,
        streamed: bool,
        result: Result<String, TransportError>,
    },
}

/// What the front-end should render after [`super::Controller::apply`].
#[derive(Debug)]
pub enum UiUpdate {
    /// The event belonged to an abandoned exchange.
    Nothing,
    Connectivity {
        reachable: bool,
        changed: bool,
    },
    ModelsRefreshed {
        count: usize,
    },
    ModelsUnavailable(TransportError),
    PullProgress {
        name: String,
        label: String,
        percentage: Option<u8>,
    },
    PullFinished {
        name: String,
        success: bool,
    },
    PullFailed {
        name: String,
        error: TransportError,
    },
    ModelDeleted {
        name: String,
    },
    /// The server did not know the model.
    ModelMissing {
        name: String,
    },
    DeleteFailed {
        name: String,
        error: TransportError,
    },
    ChatChunk(String),
    RetryingWithoutStreaming,
    ReplyCompleted {
        reply: String,
    },
    EmptyReply,
    ChatFailed(TransportError),
}

/// Result of asking the controller to send a user message.
#[derive(Debug)]
pub enum SendOutcome {
    Started,
    /// An exchange is already in flight; the message was dropped.
    Busy,
    NoModel,
    /// Nothing to send after trimming.
    Empty,
    Rejected(StoreError),
}
