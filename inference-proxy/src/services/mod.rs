pub mod blob;
pub mod dispatch;
pub mod media;
pub mod metrics;
pub mod passthrough;
pub mod status;
pub mod upstream;

pub use blob::{BlobOffloader, BlobStore, HttpBlobStore, OffloadOutcome};
pub use dispatch::{DispatchMode, DispatchPolicy, DispatchRouter};
pub use media::MediaNormalizer;
pub use passthrough::ProviderPassthrough;
pub use status::{StatusResolver, StatusTarget};
pub use upstream::{UpstreamBody, UpstreamClient, UpstreamReply};
