pub mod error;
pub mod header;
pub mod hash;
pub mod record;
pub mod cache;
pub mod alloc;
pub mod stream;
pub mod bundle;

pub use error::{BundleError, Result};
pub use header::{BundleHeader, ChainOffset, FreeOffset};
pub use record::{FileInfo, directory_time};
pub use stream::{ContentReader, ContentWriter};
pub use bundle::{Bundle, BundleOptions, BundleStats};
