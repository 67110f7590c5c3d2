/// Default folder (relative to the workspace root) for intermediate build files.
pub const DEFAULT_INTERMEDIATE_FOLDER: &str = "Cache/Intermediate";

/// Default folder (relative to the workspace root) for link artifacts.
pub const DEFAULT_BINARIES_FOLDER: &str = "Bin";

/// Default rules manifest file name.
pub const MANIFEST_FILE_NAME: &str = "Kiln.toml";

/// Folder name under a project root holding its modules.
pub const PROJECT_SOURCE_FOLDER: &str = "Source";

/// Length of the hex fingerprints used as cache keys.
pub const FINGERPRINT_LEN: usize = 32;

/// Hex digits of the path hash that tells apart objects of same-named sources.
pub const OBJECT_HASH_LEN: usize = 8;

/// Version tag of the persisted code-generation cache.
pub const CODEGEN_CACHE_VERSION: u32 = 1;

/// Version tag of the persisted work-item cache.
pub const TASK_CACHE_VERSION: u32 = 1;

/// File name of the work-item cache inside a target's intermediate folder.
pub const TASK_CACHE_FILE_NAME: &str = "TaskGraph.cache";

/// Reflection markup macros whose presence marks a header for code generation.
pub const DEFAULT_MARKUP_TOKENS: &[&str] = &["NCLASS", "NSTRUCT", "NENUM", "NFUNCTION", "NPROPERTY"];
