//! Batch request building and the request/stream/unpack chain of one round.

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use indicatif::HumanBytes;
use reqwest::multipart::{Form, Part};
use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::archive::{self, ArchiveEntry};
use crate::client::{file_part, ConverterClient};
use crate::error::ConvertError;
use crate::input::FileLike;
use crate::options::ConversionOptions;
use crate::pending::PendingFile;
use crate::progress::{ProgressGuard, ProgressIndicator};
use crate::round::RoundMachine;

/// Per-round limits enforced by the backend, checked before sending.
pub const MAX_FILES: usize = 50;
pub const MAX_TOTAL_SIZE: u64 = 100 * 1024 * 1024;

pub const TARGET_FORMAT_FIELD: &str = "target_format";
pub const QUALITY_FIELD: &str = "quality";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormField {
    File { field: String, file: FileLike },
    Text { field: String, value: String },
}

/// Every pending file plus the options, as one multipart submission.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    fields: Vec<FormField>,
}

impl BatchRequest {
    pub fn build(files_field: &str, files: &[PendingFile], options: &ConversionOptions) -> Self {
        let mut fields: Vec<FormField> = files
            .iter()
            .map(|pending| FormField::File {
                field: files_field.to_string(),
                file: pending.file.clone(),
            })
            .collect();
        fields.push(FormField::Text {
            field: TARGET_FORMAT_FIELD.to_string(),
            value: options.target_format.as_str().to_string(),
        });
        fields.push(FormField::Text {
            field: QUALITY_FIELD.to_string(),
            value: options.quality.to_string(),
        });
        Self { fields }
    }

    pub fn files(&self) -> impl Iterator<Item = &FileLike> {
        self.fields.iter().filter_map(|f| match f {
            FormField::File { file, .. } => Some(file),
            FormField::Text { .. } => None,
        })
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.iter().find_map(|f| match f {
            FormField::Text { field, value } if field == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn into_form(self) -> Result<Form, ConvertError> {
        let mut form = Form::new();
        for field in self.fields {
            form = match field {
                FormField::File { field, file } => form.part(field, file_part(&file)?),
                FormField::Text { field, value } => form.part(field, Part::text(value)),
            };
        }
        Ok(form)
    }
}

/// Rejects selections the backend would refuse anyway.
pub fn preflight(files: &[PendingFile]) -> Result<(), ConvertError> {
    if files.is_empty() {
        return Err(ConvertError::EmptySelection);
    }
    if files.len() > MAX_FILES {
        return Err(ConvertError::TooManyFiles {
            count: files.len(),
            max: MAX_FILES,
        });
    }
    let total: u64 = files.iter().map(PendingFile::size).sum();
    if total > MAX_TOTAL_SIZE {
        return Err(ConvertError::TooLarge {
            total,
            max: MAX_TOTAL_SIZE,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct RoundOutput {
    pub archive: Bytes,
    pub entries: Vec<ArchiveEntry>,
}

/// Runs one round: POST, stream the body with progress, unpack the archive.
///
/// The progress indicator is hidden when this returns, whatever the outcome.
pub async fn run_round(
    client: &ConverterClient,
    path: &str,
    request: BatchRequest,
    round: &mut RoundMachine,
    progress: &mut ProgressIndicator,
    cancel: &CancellationToken,
) -> Result<RoundOutput, ConvertError> {
    let mut progress = progress.guard();

    tracing::debug!(
        files = request.files().count(),
        format = request.text(TARGET_FORMAT_FIELD).unwrap_or_default(),
        "submitting batch"
    );
    let form = request.into_form()?;
    let response = client.post_form(path, form, cancel).await?;

    round.streaming();
    let archive = receive(response, &mut progress, cancel).await?;
    tracing::info!("Received {} archive", HumanBytes(archive.len() as u64));
    tracing::debug!(received = progress.received(), ratio = ?progress.ratio(), "body complete");

    round.unpacking();
    progress.set_message("Unpacking");
    let entries = unpack(archive.clone(), cancel).await?;

    Ok(RoundOutput { archive, entries })
}

async fn receive(
    response: Response,
    progress: &mut ProgressGuard<'_>,
    cancel: &CancellationToken,
) -> Result<Bytes, ConvertError> {
    let total = response.content_length();
    progress.show(total, "Receiving");

    // Content-Length is only a hint for the buffer
    let capacity = total.unwrap_or(0).min(MAX_TOTAL_SIZE) as usize;
    let mut buf = BytesMut::with_capacity(capacity);
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
            next = stream.next() => next,
        };
        match next {
            Some(chunk) => {
                let chunk = chunk?;
                buf.extend_from_slice(&chunk);
                progress.advance(chunk.len() as u64);
            }
            None => break,
        }
    }

    Ok(buf.freeze())
}

async fn unpack(archive: Bytes, cancel: &CancellationToken) -> Result<Vec<ArchiveEntry>, ConvertError> {
    let task = tokio::task::spawn_blocking(move || archive::unpack(&archive));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        joined = task => joined.map_err(|e| ConvertError::Io(std::io::Error::other(e)))?,
    }
}
