use reqwest::{Client, Request};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LookupError;

/// Query values are form-encoded, so symbols like `M&G` or `BRK B` survive.
pub fn build_request(
    client: &Client,
    base_url: &str,
    endpoint: &str,
    params: &[(&str, &str)],
    api_key: &str,
) -> Result<Request, LookupError> {
    Ok(client
        .get(format!("{}/{}", base_url, endpoint))
        .query(params)
        .query(&[("apikey", api_key)])
        .build()?)
}

pub async fn make_request(
    client: &Client,
    base_url: &str,
    endpoint: &str,
    params: &[(&str, &str)],
    api_key: &str,
) -> Result<Value, LookupError> {
    let request = build_request(client, base_url, endpoint, params, api_key)?;
    let res = client.execute(request).await?;

    if !res.status().is_success() {
        return Err(LookupError::Http(format!("Request failed: {}", res.status())));
    }

    let text = res.text().await?;
    let data = serde_json::from_str::<Value>(&text)?;

    Ok(data)
}

/// Items that do not deserialize are dropped; an empty array is not an error.
pub fn parse_response_array<T>(data: Value) -> Result<Vec<T>, LookupError>
where
    T: DeserializeOwned,
{
    match data {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        Value::Object(obj) if obj.contains_key("Error Message") => Err(LookupError::Unavailable(
            obj["Error Message"].as_str().unwrap_or_default().to_string(),
        )),
        _ => Err(LookupError::Decode(
            "Unexpected API response format: not an array".to_string(),
        )),
    }
}
