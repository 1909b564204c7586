use serde::{Deserialize, Serialize};

/// Closed enumeration of cross-stage metadata keys (§3, §9 "Dynamic bag →
/// closed key enumeration"). The source stores this as a free-form
/// string-keyed map; here an unknown key is a compile-time error rather than
/// a typo waiting to happen at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKey {
    RepositoryAnalysis,
    DetectedLanguage,
    DetectedFramework,
    DetectedDatabases,
    ToolList,
    PriorFixAttempts,
}

impl MetadataKey {
    pub const ALL: &'static [MetadataKey] = &[
        MetadataKey::RepositoryAnalysis,
        MetadataKey::DetectedLanguage,
        MetadataKey::DetectedFramework,
        MetadataKey::DetectedDatabases,
        MetadataKey::ToolList,
        MetadataKey::PriorFixAttempts,
    ];
}
