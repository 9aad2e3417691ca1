use serde::{Deserialize, Serialize};

/// Identity carried in the `user` field of a verified Mini App launch
/// payload. Lives for the duration of one authentication call; the durable
/// record is the backing account it resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub language_code: Option<String>,
}
