pub mod yaml;

pub use yaml::{
    read_manifest, validate_manifest, BulkManifest, ReadManifestError, ValidateManifestError,
    YAML_MANIFEST_NAME,
};
