use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use synchron_core::config::GoogleConfig;
use synchron_core::Credential;
use tracing::{debug, warn};

use crate::source::{Rows, SheetSource, SourceError, SourceInfo, TabInfo};

const SPREADSHEET_MIME_QUERY: &str = "mimeType='application/vnd.google-apps.spreadsheet'";

/// Google Drive + Sheets v4 client authenticated with the owner's bearer token.
pub struct GoogleSheetsClient {
    client: reqwest::Client,
    sheets_base_url: String,
    drive_base_url: String,
}

impl GoogleSheetsClient {
    pub fn new(config: &GoogleConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            sheets_base_url: config.sheets_base_url.trim_end_matches('/').to_string(),
            drive_base_url: config.drive_base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
        credential: &Credential,
        what: &str,
    ) -> Result<T, SourceError> {
        let resp = request.bearer_auth(&credential.access_token).send().await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Google API error");
            return Err(match status {
                401 | 403 => SourceError::Unauthorized(format!("{what}: {text}")),
                404 => SourceError::NotFound(what.to_string()),
                _ => SourceError::Api {
                    status,
                    message: text,
                },
            });
        }

        resp.json()
            .await
            .map_err(|e| SourceError::Parse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<SourceInfo>,
}

#[derive(Debug, Deserialize)]
struct Spreadsheet {
    #[serde(default)]
    sheets: Vec<Sheet>,
}

#[derive(Debug, Deserialize)]
struct Sheet {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// The API omits `values` entirely for an empty range.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

fn cell_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_range_rows(range: ValueRange) -> Rows {
    range
        .values
        .into_iter()
        .map(|row| row.into_iter().map(cell_text).collect())
        .collect()
}

fn spreadsheet_tabs(sheet: Spreadsheet) -> Vec<TabInfo> {
    sheet
        .sheets
        .into_iter()
        .map(|s| TabInfo {
            id: s.properties.sheet_id,
            name: s.properties.title,
        })
        .collect()
}

#[async_trait]
impl SheetSource for GoogleSheetsClient {
    fn name(&self) -> &str {
        "google-sheets"
    }

    async fn list_sources(&self, credential: &Credential) -> Result<Vec<SourceInfo>, SourceError> {
        let url = format!("{}/drive/v3/files", self.drive_base_url);
        debug!("listing spreadsheets from Drive");

        let request = self.client.get(&url).query(&[
            ("q", SPREADSHEET_MIME_QUERY),
            ("fields", "files(id, name)"),
            ("orderBy", "modifiedTime desc"),
        ]);
        let list: FileList = self.get_json(request, credential, "spreadsheet list").await?;
        Ok(list.files)
    }

    async fn list_tabs(
        &self,
        credential: &Credential,
        sheet_id: &str,
    ) -> Result<Vec<TabInfo>, SourceError> {
        let url = format!(
            "{}/v4/spreadsheets/{}",
            self.sheets_base_url,
            urlencoding::encode(sheet_id)
        );
        debug!(sheet_id, "listing tabs");

        let request = self.client.get(&url).query(&[("fields", "sheets.properties")]);
        let sheet: Spreadsheet = self
            .get_json(request, credential, &format!("spreadsheet {sheet_id}"))
            .await?;
        Ok(spreadsheet_tabs(sheet))
    }

    async fn fetch_range(
        &self,
        credential: &Credential,
        sheet_id: &str,
        tab_name: &str,
    ) -> Result<Rows, SourceError> {
        let url = format!(
            "{}/v4/spreadsheets/{}/values/{}",
            self.sheets_base_url,
            urlencoding::encode(sheet_id),
            urlencoding::encode(tab_name)
        );
        debug!(sheet_id, tab_name, "fetching range");

        let range: ValueRange = self
            .get_json(
                self.client.get(&url),
                credential,
                &format!("range {tab_name} in spreadsheet {sheet_id}"),
            )
            .await?;
        Ok(value_range_rows(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_field_means_no_rows() {
        let range: ValueRange =
            serde_json::from_str(r#"{"range":"Sheet1!A1:Z1000","majorDimension":"ROWS"}"#)
                .unwrap();
        assert!(value_range_rows(range).is_empty());
    }

    #[test]
    fn non_string_cells_are_rendered_as_text() {
        let range: ValueRange =
            serde_json::from_str(r#"{"values":[["sku","qty","ok"],["A-1",12,true,null]]}"#)
                .unwrap();
        let rows = value_range_rows(range);
        assert_eq!(rows[0], vec!["sku", "qty", "ok"]);
        assert_eq!(rows[1], vec!["A-1", "12", "true", ""]);
    }

    #[test]
    fn ragged_rows_are_kept_as_returned() {
        let range: ValueRange =
            serde_json::from_str(r#"{"values":[["a","b","c"],["1"]]}"#).unwrap();
        let rows = value_range_rows(range);
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn tabs_come_from_sheet_properties() {
        let json = r#"{"sheets":[
            {"properties":{"sheetId":0,"title":"Summary","index":0}},
            {"properties":{"sheetId":918273,"title":"Raw data","index":1}}
        ]}"#;
        let tabs = spreadsheet_tabs(serde_json::from_str(json).unwrap());
        assert_eq!(
            tabs,
            vec![
                TabInfo { id: 0, name: "Summary".into() },
                TabInfo { id: 918273, name: "Raw data".into() },
            ]
        );
    }

    #[test]
    fn file_list_tolerates_empty_response() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
    }

    #[test]
    fn client_trims_trailing_slashes() {
        let cfg = GoogleConfig {
            sheets_base_url: "http://localhost:9000/".into(),
            drive_base_url: "http://localhost:9001//".into(),
            request_timeout_secs: 1,
        };
        let client = GoogleSheetsClient::new(&cfg).unwrap();
        assert_eq!(client.sheets_base_url, "http://localhost:9000");
        assert_eq!(client.drive_base_url, "http://localhost:9001");
    }
}
