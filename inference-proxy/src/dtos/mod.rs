pub mod proxy;

pub use proxy::{DispatchRequest, StatusByIdQuery, StatusQuery};
