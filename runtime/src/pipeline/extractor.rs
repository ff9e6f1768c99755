use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use lopdf::Document as PdfDocument;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

use super::{
    rtf::rtf_to_text,
    status::{Phase, PipelineStatus},
    utils::file_extension,
};

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "log", "csv", "json", "xml", "html"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatFamily {
    PlainText,
    Pdf,
    Rtf,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFormat {
    pub family: FormatFamily,
    pub extension: String,
}

impl DocumentFormat {
    pub fn detect(filename: &str) -> Self {
        let extension = file_extension(filename).unwrap_or_else(|| "unknown".to_string());
        let family = match extension.as_str() {
            ext if PLAIN_TEXT_EXTENSIONS.contains(&ext) => FormatFamily::PlainText,
            "pdf" => FormatFamily::Pdf,
            "rtf" => FormatFamily::Rtf,
            _ => FormatFamily::Unknown,
        };
        Self { family, extension }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    pub text: String,
    pub format: DocumentFormat,
    pub pages: Option<usize>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("PDF is encrypted")]
    EncryptedPdf,
    #[error("failed to decode .{extension} content as UTF-8: {reason}")]
    Undecodable { extension: String, reason: String },
    #[error("decoded .{extension} content is empty")]
    EmptyContent { extension: String },
    #[error("parser panicked: {0}")]
    Panicked(String),
}

pub trait DocumentExtractor: Send + Sync {
    fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        status: &mut PipelineStatus,
    ) -> Result<ExtractedText, ExtractError>;
}

/// Dispatches on the filename extension. Never panics past its boundary:
/// parser failures come back as [`ExtractError`] and are logged on the
/// document's `content_parsing` phase.
#[derive(Debug, Default, Clone)]
pub struct FormatExtractor;

impl DocumentExtractor for FormatExtractor {
    fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
        status: &mut PipelineStatus,
    ) -> Result<ExtractedText, ExtractError> {
        let format = DocumentFormat::detect(filename);
        let handle = status.start(
            Phase::ContentParsing,
            Some(filename),
            format!(
                "Parsing '{filename}' (format: {}, size: {} bytes)",
                format.extension,
                bytes.len()
            ),
        );

        let result = match format.family {
            FormatFamily::PlainText => Ok(decode_plain_text(bytes, filename, status)),
            FormatFamily::Rtf => Ok(decode_rtf(bytes, filename, status)),
            FormatFamily::Pdf => extract_pdf(bytes).map(|(text, pages)| (text, Some(pages))),
            FormatFamily::Unknown => {
                status.warn(
                    Phase::ContentParsing,
                    format!(
                        "Unknown file format '.{}' for '{filename}', attempting UTF-8 decode",
                        format.extension
                    ),
                );
                decode_unknown(bytes, &format.extension).map(|text| (text, None))
            }
        };

        match result {
            Ok((text, pages)) => {
                let mut metrics = json!({
                    "format": format.extension,
                    "bytes": bytes.len(),
                    "text_length": text.chars().count(),
                });
                if let (Some(pages), Value::Object(map)) = (pages, &mut metrics) {
                    map.insert("pages".to_string(), json!(pages));
                }
                let details = match pages {
                    Some(pages) => format!("Extracted {} ({pages} pages)", format.extension),
                    None => format!("Decoded {} content", format.extension),
                };
                status.succeed(handle, details, metrics);
                Ok(ExtractedText {
                    text,
                    format,
                    pages,
                })
            }
            Err(err) => {
                status.fail(handle, err.to_string());
                Err(err)
            }
        }
    }
}

fn decode_plain_text(
    bytes: &[u8],
    filename: &str,
    status: &mut PipelineStatus,
) -> (String, Option<usize>) {
    if bytes.is_empty() {
        status.warn(Phase::ContentParsing, format!("Document '{filename}' is empty"));
    }
    (String::from_utf8_lossy(bytes).into_owned(), None)
}

fn decode_rtf(
    bytes: &[u8],
    filename: &str,
    status: &mut PipelineStatus,
) -> (String, Option<usize>) {
    let raw = String::from_utf8_lossy(bytes);
    match rtf_to_text(&raw) {
        Ok(text) => (text, None),
        Err(err) => {
            status.warn(
                Phase::ContentParsing,
                format!("RTF conversion failed for '{filename}' ({err}), using raw text"),
            );
            (raw.into_owned(), None)
        }
    }
}

fn decode_unknown(bytes: &[u8], extension: &str) -> Result<String, ExtractError> {
    let text = String::from_utf8(bytes.to_vec()).map_err(|err| ExtractError::Undecodable {
        extension: extension.to_string(),
        reason: err.utf8_error().to_string(),
    })?;
    if text.trim().is_empty() {
        return Err(ExtractError::EmptyContent {
            extension: extension.to_string(),
        });
    }
    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    panic::catch_unwind(AssertUnwindSafe(|| parse_pdf(bytes)))
        .unwrap_or_else(|payload| Err(ExtractError::Panicked(panic_message(payload.as_ref()))))
}

fn parse_pdf(bytes: &[u8]) -> Result<(String, usize), ExtractError> {
    let document =
        PdfDocument::load_mem(bytes).map_err(|err| ExtractError::Pdf(err.to_string()))?;
    if document.is_encrypted() {
        return Err(ExtractError::EncryptedPdf);
    }

    let pages = document.get_pages();
    let total = pages.len();
    debug!(pages = total, "pdf loaded");

    let mut parts = Vec::with_capacity(total);
    for (index, page_number) in pages.keys().enumerate() {
        let text = document
            .extract_text(&[*page_number])
            .map_err(|err| ExtractError::Pdf(format!("page {page_number}: {err}")))?;
        parts.push(text);
        if (index + 1) % 10 == 0 {
            debug!(processed = index + 1, total, "pdf pages processed");
        }
    }

    Ok((parts.join("\n"), total))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
