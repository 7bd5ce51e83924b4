use serde::Serialize;

#[derive(Serialize)]
pub struct UpdateQuery<'a> {
    #[serde(rename = "updateURL")]
    pub update_url: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub api_type: Option<&'a str>,
    #[serde(rename = "dry-run", skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}
