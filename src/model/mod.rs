pub mod convert;
pub mod fetcher;
pub mod loader;

pub use fetcher::{ArtifactFetcher, ArtifactRef, DefaultTransport, Transport};
pub use loader::ModelLoader;
