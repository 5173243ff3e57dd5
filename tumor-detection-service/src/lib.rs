pub mod remote;
pub mod service;

pub use remote::RemoteClassifier;
pub use service::{AppState, create_app};
