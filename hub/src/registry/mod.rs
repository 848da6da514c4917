pub(crate) mod error;
pub(crate) mod node_record;
pub(crate) mod registry;

pub use error::*;
pub use node_record::*;
pub use registry::*;
