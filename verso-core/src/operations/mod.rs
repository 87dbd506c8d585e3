pub mod publish;

pub use publish::{
    DatasetLoader, PartitionWriter, PublishOperation, PublishOperationRequest,
    PublishOperationResult,
};
