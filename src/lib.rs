#![forbid(unsafe_code)]

pub mod composite;
pub mod config;
pub mod error;
pub mod fetch;
pub mod image_ref;
pub mod merger;
pub mod persist;
pub mod validate;

pub use composite::composite;
pub use config::{FetchConfig, MergeConfig, OutputFormat};
pub use error::{
    CompositeError, DomainError, DomainResult, ErrorKind, FetchError, PersistError,
};
pub use fetch::{Fetcher, HttpTransport, Transport, TransportError};
pub use image_ref::ImageRef;
pub use merger::{
    MergeRequest, MergeResponse, MergeResult, MergeState, Merger, merge, merge_with_transport,
};
pub use persist::{Persisted, Persister, output_name};
pub use validate::{dimensions_equal, is_supported_format, is_valid_url};
