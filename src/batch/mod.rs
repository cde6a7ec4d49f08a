//! Batch requests: ordered operations and atomic changesets, with
//! Content-ID references between operations.

pub mod content_id;
pub mod json;
pub mod model;
pub mod multipart;
mod processor;

pub use content_id::ContentIdMap;
pub use model::{
    BatchOperation, BatchPart, BatchRequest, BatchResponse, ChangeSet, ChangeSetResponse,
    OperationResponse, PartResponse,
};
pub use processor::BatchProcessor;
