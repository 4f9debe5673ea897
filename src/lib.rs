pub mod api;
pub mod core;
pub mod stream;

pub use api::ApiClient;
pub use core::config::{ApiOptions, ClientConfig, ConfigError, StreamOptions};
pub use core::errors::{
    CallError, CloseError, ConnectError, ListenError, RecvError, SendError,
    StreamError, TransportError,
};
pub use stream::{Consumer, DispatcherState, RecordKind, StreamClient, StreamRecord, Subscription};
