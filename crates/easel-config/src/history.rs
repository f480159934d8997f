use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Supabase-backed generation history
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Project URL (the `/rest/v1` path is appended)
    pub url: Url,
    /// Anon or service key
    pub api_key: SecretString,
    /// Table holding history records
    #[serde(default = "default_table")]
    pub table: String,
    /// Owner recorded on every row; a random id is generated when absent
    #[serde(default)]
    pub user_id: Option<String>,
}

fn default_table() -> String {
    "generation_history".to_owned()
}
