//! The six stages of the support dialogue graph.

pub mod compactor;
pub mod escalator;
pub mod generator;
pub mod intent;
pub mod retriever;
pub mod router;

pub use compactor::Compactor;
pub use escalator::Escalator;
pub use generator::Generator;
pub use intent::IntentGate;
pub use retriever::MemoryRetriever;
pub use router::Router;
