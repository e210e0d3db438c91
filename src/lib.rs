pub mod aggregate;
pub mod checker;
pub mod config;
pub mod error;
pub mod model;
pub mod normalize;
pub mod output;
pub mod parser;
pub mod progress;
pub mod scan;
pub mod source;

pub use config::Config;
pub use error::{MalformedManifest, QueryError, ScanError, SourceError};
pub use model::{Ecosystem, ManifestEntry, PackageQuery, ScanResult, Severity, Vulnerability};
pub use progress::{Phase, ProgressEvent, ProgressStream};
pub use scan::ScanContext;
pub use source::FileSource;
