use anyhow::{anyhow, Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const CARQUERY_HOST: &str = "https://www.carqueryapi.com";
pub const CARQUERY_TIMEOUT_SECS: u64 = 10;

const API_PATH: &str = "/api/0.3/";
const CALLBACK: &str = "cb";
const USER_AGENT: &str = "Mozilla/5.0";
const REFERER: &str = "https://www.carqueryapi.com/";

lazy_static! {
    // cb( ... ); with the payload allowed to span lines
    static ref JSONP_ENVELOPE: Regex =
        Regex::new(r"(?s)^\s*[\w$.]*\s*\((.*)\)\s*;?\s*$").expect("valid JSONP pattern");
}

/// Strip the callback wrapper CarQuery puts around every response.
///
/// Bodies without a wrapper are parsed as plain JSON.
pub fn unwrap_jsonp(body: &str) -> Result<Value> {
    let payload = match JSONP_ENVELOPE.captures(body) {
        Some(captures) => captures.get(1).map_or("", |m| m.as_str()),
        None => body.trim(),
    };
    serde_json::from_str(payload).context("malformed CarQuery response")
}

/// One technical variant of a model, as returned by `getTrims` and `getModel`.
///
/// CarQuery hands back a flat record whose values are mostly strings, sometimes
/// numbers and often null, so it is kept as a map rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trim(pub Map<String, Value>);

impl Trim {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// A field rendered as text; null and empty values count as missing
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Engine power in PS, when the record carries an integer value
    pub fn power_ps(&self) -> Option<i64> {
        match self.0.get("model_engine_power_ps")? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn insert<K: Into<String>>(&mut self, key: K, value: Value) {
        self.0.insert(key.into(), value);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Make {
    pub make_id: Option<String>,
    pub make_display: Option<String>,
    pub make_is_common: Option<String>,
    pub make_country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelName {
    pub model_name: Option<String>,
    pub model_make_id: Option<String>,
}

/// Filters understood by `getTrims`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrimQuery {
    pub make: String,
    pub model: Option<String>,
    pub year: Option<String>,
    pub body: Option<String>,
    pub fuel_type: Option<String>,
    pub drive: Option<String>,
}

impl TrimQuery {
    pub fn new<S: Into<String>>(make: S) -> Self {
        Self {
            make: make.into(),
            ..Default::default()
        }
    }

    pub fn with_model<S: Into<String>>(mut self, model: Option<S>) -> Self {
        self.model = model.map(Into::into);
        self
    }

    pub fn with_year<S: Into<String>>(mut self, year: Option<S>) -> Self {
        self.year = year.map(Into::into);
        self
    }

    pub fn with_body<S: Into<String>>(mut self, body: Option<S>) -> Self {
        self.body = body.map(Into::into);
        self
    }

    pub fn with_fuel_type<S: Into<String>>(mut self, fuel_type: Option<S>) -> Self {
        self.fuel_type = fuel_type.map(Into::into);
        self
    }

    pub fn with_drive<S: Into<String>>(mut self, drive: Option<S>) -> Self {
        self.drive = drive.map(Into::into);
        self
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("cmd", "getTrims".to_string()), ("make", self.make.clone())];
        let optional = [
            ("model", &self.model),
            ("year", &self.year),
            ("body", &self.body),
            ("fuel_type", &self.fuel_type),
            ("drive", &self.drive),
        ];
        for (key, value) in optional {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                params.push((key, value.to_string()));
            }
        }
        params
    }
}

#[derive(Debug, Clone)]
pub struct CarQueryConfig {
    pub host: String,
    pub timeout: Duration,
}

impl Default for CarQueryConfig {
    fn default() -> Self {
        Self {
            host: CARQUERY_HOST.to_string(),
            timeout: Duration::from_secs(CARQUERY_TIMEOUT_SECS),
        }
    }
}

/// Thin client for the public CarQuery API
#[derive(Debug, Clone)]
pub struct CarQueryClient {
    client: Client,
    config: CarQueryConfig,
}

impl CarQueryClient {
    pub fn new(config: CarQueryConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn get(&self, mut params: Vec<(&'static str, String)>) -> Result<Value> {
        let url = format!("{}{}", self.config.host.trim_end_matches('/'), API_PATH);
        params.push(("callback", CALLBACK.to_string()));
        tracing::debug!(?params, "CarQuery request");

        let response = self
            .client
            .get(&url)
            .query(&params)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::REFERER, REFERER)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await?;
                unwrap_jsonp(&body)
            }
            status => Err(anyhow!("CarQuery request failed: {}", status)),
        }
    }

    /// All manufacturers, optionally only those producing cars in `year`
    pub async fn get_makes(&self, year: Option<&str>) -> Result<Vec<Make>> {
        let mut params = vec![("cmd", "getMakes".to_string())];
        push_optional(&mut params, "year", year);
        take_list(self.get(params).await?, "Makes")
    }

    pub async fn get_models(
        &self,
        make: &str,
        year: Option<&str>,
        body: Option<&str>,
    ) -> Result<Vec<ModelName>> {
        let mut params = vec![("cmd", "getModels".to_string()), ("make", make.to_string())];
        push_optional(&mut params, "year", year);
        push_optional(&mut params, "body", body);
        take_list(self.get(params).await?, "Models")
    }

    pub async fn get_trims(&self, query: &TrimQuery) -> Result<Vec<Trim>> {
        take_list(self.get(query.params()).await?, "Trims")
    }

    /// Detailed record for a single model id; `getModel` answers with a one element list
    pub async fn get_model(&self, model_id: &str) -> Result<Option<Trim>> {
        let params = vec![("cmd", "getModel".to_string()), ("model", model_id.to_string())];
        let data = self.get(params).await?;
        let record = match data {
            Value::Array(items) => items.into_iter().next(),
            Value::Null => None,
            other => Some(other),
        };
        match record {
            Some(Value::Object(map)) if !map.is_empty() => Ok(Some(Trim(map))),
            Some(Value::Object(_)) | Some(Value::Null) | None => Ok(None),
            Some(other) => Err(anyhow!("unexpected getModel record: {}", other)),
        }
    }
}

fn push_optional(params: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        params.push((key, value.to_string()));
    }
}

fn take_list<T: DeserializeOwned>(mut data: Value, key: &str) -> Result<Vec<T>> {
    match data.get_mut(key).map(Value::take) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(list) => serde_json::from_value(list)
            .with_context(|| format!("unexpected shape of CarQuery {}", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(cmd: &str, body: &str) -> (MockServer, CarQueryClient) {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/0.3/"))
            .and(query_param("cmd", cmd))
            .and(query_param("callback", "cb"))
            .and(header("referer", REFERER))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;

        let client = CarQueryClient::new(CarQueryConfig {
            host: mock_server.uri(),
            ..Default::default()
        })
        .unwrap();
        (mock_server, client)
    }

    #[test]
    fn test_unwrap_jsonp_envelope() {
        let value = unwrap_jsonp("cb({\"Makes\":[\n{\"make_id\":\"bmw\"}]});").unwrap();
        assert_eq!(value, json!({"Makes": [{"make_id": "bmw"}]}));
    }

    #[test]
    fn test_unwrap_plain_json_with_parentheses() {
        let value = unwrap_jsonp(r#"{"model_trim": "2.0 (150hp)"}"#).unwrap();
        assert_eq!(value["model_trim"], "2.0 (150hp)");
    }

    #[test]
    fn test_unwrap_garbage_fails() {
        assert!(unwrap_jsonp("<html>blocked</html>").is_err());
        assert!(unwrap_jsonp("cb(not json);").is_err());
    }

    #[test]
    fn test_power_parsing() {
        let trim: Trim = serde_json::from_value(json!({"model_engine_power_ps": "140"})).unwrap();
        assert_eq!(trim.power_ps(), Some(140));
        let trim: Trim = serde_json::from_value(json!({"model_engine_power_ps": 98})).unwrap();
        assert_eq!(trim.power_ps(), Some(98));
        let trim: Trim = serde_json::from_value(json!({"model_engine_power_ps": "n/a"})).unwrap();
        assert_eq!(trim.power_ps(), None);
        let trim: Trim = serde_json::from_value(json!({"model_engine_power_ps": null})).unwrap();
        assert_eq!(trim.power_ps(), None);
    }

    #[test]
    fn test_text_treats_empty_as_missing() {
        let trim: Trim =
            serde_json::from_value(json!({"a": "", "b": null, "c": 4, "d": "Sedan"})).unwrap();
        assert_eq!(trim.text("a"), None);
        assert_eq!(trim.text("b"), None);
        assert_eq!(trim.text("c"), Some("4".to_string()));
        assert_eq!(trim.text("d"), Some("Sedan".to_string()));
        assert_eq!(trim.text("missing"), None);
    }

    #[tokio::test]
    async fn test_get_makes() -> Result<()> {
        let body = r#"cb({"Makes":[{"make_id":"toyota","make_display":"Toyota","make_is_common":"1","make_country":"Japan"}]});"#;
        let (_server, client) = setup_mock_server("getMakes", body).await;

        let makes = client.get_makes(None).await?;
        assert_eq!(makes.len(), 1);
        assert_eq!(makes[0].make_display.as_deref(), Some("Toyota"));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_trims_forwards_filters() -> Result<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/0.3/"))
            .and(query_param("cmd", "getTrims"))
            .and(query_param("make", "Toyota"))
            .and(query_param("model", "Corolla"))
            .and(query_param("year", "2020"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"cb({"Trims":[{"model_id":"1","model_name":"Corolla"}]});"#),
            )
            .mount(&mock_server)
            .await;
        let client = CarQueryClient::new(CarQueryConfig {
            host: mock_server.uri(),
            ..Default::default()
        })?;

        let query = TrimQuery::new("Toyota")
            .with_model(Some("Corolla"))
            .with_year(Some("2020"));
        let trims = client.get_trims(&query).await?;
        assert_eq!(trims.len(), 1);
        assert_eq!(trims[0].text("model_name").as_deref(), Some("Corolla"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_list_key_is_empty() -> Result<()> {
        let (_server, client) = setup_mock_server("getModels", "cb({});").await;
        assert!(client.get_models("Nobody", None, None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_get_model_unwraps_single_element_list() -> Result<()> {
        let body = r#"cb([{"model_id":"42","model_make_id":"BMW","model_name":"X5"}]);"#;
        let (_server, client) = setup_mock_server("getModel", body).await;

        let trim = client.get_model("42").await?.expect("record");
        assert_eq!(trim.text("model_name").as_deref(), Some("X5"));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_model_empty_list_is_none() -> Result<()> {
        let (_server, client) = setup_mock_server("getModel", "cb([]);").await;
        assert_eq!(client.get_model("0").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        let client = CarQueryClient::new(CarQueryConfig {
            host: mock_server.uri(),
            ..Default::default()
        })
        .unwrap();

        let err = client.get_makes(Some("2020")).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
