use serde::Serialize;

/// Identity record, keyed by the identity provider's uid.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}
