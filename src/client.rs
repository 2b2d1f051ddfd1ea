//! HTTP client for the conversion backend.

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Response};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::ConvertError;
use crate::input::FileLike;
use crate::utils::extension_for_media_type;

pub const IMAGES_CONVERT_PATH: &str = "/api/v1/images/convert";
pub const DOCX_TO_PDF_PATH: &str = "/api/v1/files/convert/docx-to-pdf";
pub const IMAGES_RESIZE_PATH: &str = "/api/v1/images/resize";
pub const UNITS_CONVERT_PATH: &str = "/api/v1/units/convert";
pub const CURRENCY_CONVERT_PATH: &str = "/api/v1/currency/convert";

const DEFAULT_RESIZE_EXTENSION: &str = "png";

/// A single converted artifact returned by a one-file endpoint.
#[derive(Debug, Clone)]
pub struct SingleOutput {
    pub filename: String,
    pub media_type: String,
    pub data: Bytes,
}

/// `{input, output}` pair returned by the unit and currency endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QuantityResult {
    pub input: String,
    pub output: String,
}

impl fmt::Display for QuantityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.input, self.output)
    }
}

#[derive(Clone)]
pub struct ConverterClient {
    client: Client,
    base_url: Url,
}

impl ConverterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid server URL: {}", base_url))?;
        let client = Client::builder()
            .user_agent(concat!("rconv/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", self.base_url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url
    }

    /// Sends one multipart POST and fails on any non-success status.
    pub async fn post_form(
        &self,
        path: &str,
        form: Form,
        cancel: &CancellationToken,
    ) -> Result<Response, ConvertError> {
        let url = self.endpoint(path);
        tracing::info!("POST {}", url);

        let send = self.client.post(url).multipart(form).send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
            response = send => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Backend answered {}: {}", status, body);
            return Err(ConvertError::Status { status, body });
        }
        Ok(response)
    }

    pub async fn docx_to_pdf(&self, file: &FileLike, cancel: &CancellationToken) -> Result<SingleOutput, ConvertError> {
        let form = Form::new().part("file", file_part(file)?);
        let response = self.post_form(DOCX_TO_PDF_PATH, form, cancel).await?;
        let media_type = content_type(&response).unwrap_or_else(|| "application/pdf".to_string());
        let data = read_body(response, cancel).await?;

        Ok(SingleOutput {
            filename: "converted.pdf".to_string(),
            media_type,
            data,
        })
    }

    /// Resizes one image. Only the supplied dimensions are sent.
    pub async fn resize(
        &self,
        file: &FileLike,
        width: Option<u32>,
        height: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<SingleOutput, ConvertError> {
        let mut form = Form::new().part("file", file_part(file)?);
        if let Some(width) = width {
            form = form.text("width", width.to_string());
        }
        if let Some(height) = height {
            form = form.text("height", height.to_string());
        }

        let response = self.post_form(IMAGES_RESIZE_PATH, form, cancel).await?;
        let media_type = content_type(&response).unwrap_or_else(|| "image/png".to_string());
        let extension = resize_extension(width.is_some() && height.is_some(), &media_type);
        let data = read_body(response, cancel).await?;

        Ok(SingleOutput {
            filename: format!("resized.{}", extension),
            media_type,
            data,
        })
    }

    pub async fn convert_units(&self, value: f64, from_unit: &str, to_unit: &str) -> Result<QuantityResult, ConvertError> {
        let form = Form::new()
            .text("value", value.to_string())
            .text("from_unit", from_unit.to_string())
            .text("to_unit", to_unit.to_string());
        self.post_quantity(UNITS_CONVERT_PATH, form).await
    }

    pub async fn convert_currency(&self, value: f64, from_currency: &str, to_currency: &str) -> Result<QuantityResult, ConvertError> {
        let form = Form::new()
            .text("value", value.to_string())
            .text("from_currency", from_currency.to_string())
            .text("to_currency", to_currency.to_string());
        self.post_quantity(CURRENCY_CONVERT_PATH, form).await
    }

    async fn post_quantity(&self, path: &str, form: Form) -> Result<QuantityResult, ConvertError> {
        let response = self.post_form(path, form, &CancellationToken::new()).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

pub fn file_part(file: &FileLike) -> Result<Part, ConvertError> {
    let part = Part::bytes(file.data.to_vec())
        .file_name(file.name.clone())
        .mime_str(&file.media_type)?;
    Ok(part)
}

fn content_type(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()
        .map(|s| s.to_string())
}

fn resize_extension(both_dimensions: bool, media_type: &str) -> String {
    if both_dimensions {
        if let Some(ext) = extension_for_media_type(media_type) {
            return ext.to_string();
        }
    }
    DEFAULT_RESIZE_EXTENSION.to_string()
}

async fn read_body(response: Response, cancel: &CancellationToken) -> Result<Bytes, ConvertError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        body = response.bytes() => Ok(body?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn png() -> FileLike {
        FileLike::new("cat.png", "image/png", "fake-png-bytes")
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let client = ConverterClient::new("http://localhost:8000/converter/").unwrap();
        assert_eq!(
            client.endpoint(IMAGES_CONVERT_PATH).as_str(),
            "http://localhost:8000/converter/api/v1/images/convert"
        );
        let client = ConverterClient::new("http://localhost:8000").unwrap();
        assert_eq!(
            client.endpoint(UNITS_CONVERT_PATH).as_str(),
            "http://localhost:8000/api/v1/units/convert"
        );
    }

    #[test]
    fn test_resize_extension_policy() {
        assert_eq!(resize_extension(true, "image/webp"), "webp");
        assert_eq!(resize_extension(false, "image/webp"), "png");
        assert_eq!(resize_extension(true, "nonsense"), "png");
    }

    #[test]
    fn test_quantity_display() {
        let result = QuantityResult {
            input: "1 km".to_string(),
            output: "1000 m".to_string(),
        };
        assert_eq!(result.to_string(), "1 km = 1000 m");
    }

    #[tokio::test]
    async fn test_units_convert() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", UNITS_CONVERT_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("name=\"value\"\r\n\r\n2.5\r\n".to_string()),
                Matcher::Regex("name=\"from_unit\"\r\n\r\nkm\r\n".to_string()),
                Matcher::Regex("name=\"to_unit\"\r\n\r\nm\r\n".to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"input": "2.5 km", "output": "2500.0 meter"}"#)
            .create_async()
            .await;

        let client = ConverterClient::new(&server.url()).unwrap();
        let result = client.convert_units(2.5, "km", "m").await.unwrap();
        assert_eq!(result.to_string(), "2.5 km = 2500.0 meter");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_currency_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", CURRENCY_CONVERT_PATH)
            .with_status(502)
            .with_body("rates unavailable")
            .create_async()
            .await;

        let client = ConverterClient::new(&server.url()).unwrap();
        match client.convert_currency(10.0, "usd", "eur").await {
            Err(ConvertError::Status { status, body }) => {
                assert_eq!(status.as_u16(), 502);
                assert_eq!(body, "rates unavailable");
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resize_extension_from_content_type() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", IMAGES_RESIZE_PATH)
            .match_body(Matcher::Regex("name=\"width\"\r\n\r\n64\r\n".to_string()))
            .with_status(200)
            .with_header("content-type", "image/webp")
            .with_body("resized")
            .create_async()
            .await;

        let client = ConverterClient::new(&server.url()).unwrap();
        let cancel = CancellationToken::new();

        let both = client.resize(&png(), Some(64), Some(32), &cancel).await.unwrap();
        assert_eq!(both.filename, "resized.webp");
        assert_eq!(both.data.as_ref(), b"resized");

        let width_only = client.resize(&png(), Some(64), None, &cancel).await.unwrap();
        assert_eq!(width_only.filename, "resized.png");
    }

    #[tokio::test]
    async fn test_docx_to_pdf() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", DOCX_TO_PDF_PATH)
            .match_body(Matcher::Regex("filename=\"report.docx\"".to_string()))
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.4 fake")
            .create_async()
            .await;

        let client = ConverterClient::new(&server.url()).unwrap();
        let doc = FileLike::new("report.docx", "application/octet-stream", "docx-bytes");
        let output = client.docx_to_pdf(&doc, &CancellationToken::new()).await.unwrap();
        assert_eq!(output.filename, "converted.pdf");
        assert_eq!(output.media_type, "application/pdf");
        assert!(output.data.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let server = mockito::Server::new_async().await;
        let client = ConverterClient::new(&server.url()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = client.docx_to_pdf(&png(), &cancel).await;
        assert!(matches!(result, Err(ConvertError::Cancelled)));
    }
}
