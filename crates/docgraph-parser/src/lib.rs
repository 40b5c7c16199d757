pub mod dependencies;
pub mod extractor;
pub mod repository;

pub use dependencies::resolve_repository;
pub use extractor::{extract_file, DependencyRef, RawComponent};
pub use repository::{module_path_for, parse_repository};
