pub mod transform;

pub use transform::{ReadOutcome, TransformReader};
