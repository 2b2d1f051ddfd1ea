//! The batch upload & convert widget.
//!
//! One instance owns the pending list, the conversion options, the results of
//! the latest round and every object URL handed out for previews. Input from
//! the picker, drag-and-drop and paste is normalized and filtered here, so the
//! admission policy is the same for all three sources.

use indicatif::HumanBytes;
use tokio_util::sync::CancellationToken;

use crate::cli::TargetFormat;
use crate::client::{ConverterClient, IMAGES_CONVERT_PATH};
use crate::error::ConvertError;
use crate::input::{FileLike, InputEvent, InputNormalizer, Normalized};
use crate::options::{ConversionOptions, OptionsStore};
use crate::pending::{PendingFile, PendingList, PendingRow};
use crate::pipeline::{self, BatchRequest};
use crate::progress::ProgressIndicator;
use crate::resources::ObjectUrlRegistry;
use crate::results::{DownloadLink, ResultRow, ResultsView};
use crate::round::{RoundMachine, RoundState};

#[derive(Debug, Clone)]
pub struct WidgetConfig {
    pub endpoint: String,
    /// Media type prefix admitted into the pending list.
    pub accept_family: String,
    pub files_field: String,
    pub archive_name: String,
}

impl WidgetConfig {
    pub fn image_converter() -> Self {
        Self {
            endpoint: IMAGES_CONVERT_PATH.to_string(),
            accept_family: "image/".to_string(),
            files_field: "files".to_string(),
            archive_name: "converted_images.zip".to_string(),
        }
    }
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self::image_converter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// User error, raised before any request.
    Prompt(String),
    Error(String),
    Info(String),
}

impl Notice {
    pub fn for_error(error: &ConvertError) -> Self {
        if error.is_user_error() {
            Notice::Prompt(error.to_string())
        } else {
            Notice::Error(error.to_string())
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputOutcome {
    pub added: usize,
    pub rejected: Vec<String>,
    pub open_picker: bool,
}

/// Snapshot of everything the widget displays.
#[derive(Debug, Clone)]
pub struct WidgetView {
    pub state: RoundState,
    pub options: ConversionOptions,
    pub drop_active: bool,
    pub pending: Vec<PendingRow>,
    pub results: Vec<ResultRow>,
    pub download_all: Option<DownloadLink>,
    pub notice: Option<Notice>,
    pub progress_visible: bool,
    pub submit_enabled: bool,
}

pub struct BatchWidget {
    config: WidgetConfig,
    urls: ObjectUrlRegistry,
    pending: PendingList,
    normalizer: InputNormalizer,
    options: ConversionOptions,
    store: OptionsStore,
    results: ResultsView,
    round: RoundMachine,
    progress: ProgressIndicator,
    notice: Option<Notice>,
}

impl BatchWidget {
    pub fn new(config: WidgetConfig, store: OptionsStore, progress: ProgressIndicator) -> Self {
        Self {
            config,
            urls: ObjectUrlRegistry::new(),
            pending: PendingList::new(),
            normalizer: InputNormalizer::new(),
            options: ConversionOptions::default(),
            store,
            results: ResultsView::new(),
            round: RoundMachine::new(),
            progress,
            notice: None,
        }
    }

    /// Loads the persisted options into the controls.
    pub fn init(&mut self) {
        self.store.load(&mut self.options);
        tracing::debug!(
            format = %self.options.target_format,
            quality = self.options.quality,
            "widget initialized"
        );
    }

    /// Releases every outstanding object URL and empties the widget.
    pub fn teardown(&mut self) -> usize {
        tracing::debug!("Tearing down with {} live object urls", self.urls.len());
        self.pending.clear(&mut self.urls);
        self.results.clear(&mut self.urls);
        let leaked = self.urls.revoke_all();
        if leaked > 0 {
            tracing::warn!("Revoked {} untracked object urls on teardown", leaked);
        }
        self.notice = None;
        leaked
    }

    pub fn handle_input(&mut self, event: InputEvent) -> InputOutcome {
        match self.normalizer.handle(event) {
            Normalized::Files(files) => self.admit(files),
            Normalized::OpenPicker => InputOutcome {
                open_picker: true,
                ..InputOutcome::default()
            },
            Normalized::Nothing => InputOutcome::default(),
        }
    }

    fn admit(&mut self, files: Vec<FileLike>) -> InputOutcome {
        let (accepted, rejected): (Vec<FileLike>, Vec<FileLike>) = files
            .into_iter()
            .partition(|f| f.is_in_family(&self.config.accept_family));

        let rejected: Vec<String> = rejected
            .into_iter()
            .map(|f| {
                tracing::info!("Skipping {} ({})", f.name, f.media_type);
                f.name
            })
            .collect();
        if !rejected.is_empty() {
            self.notice = Some(Notice::Info(format!(
                "Skipped {} unsupported file(s): {}",
                rejected.len(),
                rejected.join(", ")
            )));
        }

        let added = self.pending.add(accepted, &mut self.urls);
        InputOutcome {
            added,
            rejected,
            open_picker: false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<PendingFile> {
        self.pending.remove(index, &mut self.urls)
    }

    pub fn remove_id(&mut self, id: u64) -> Option<PendingFile> {
        self.pending.remove_id(id, &mut self.urls)
    }

    pub fn clear(&mut self) {
        self.pending.clear(&mut self.urls);
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn set_format(&mut self, format: TargetFormat) {
        self.options.target_format = format;
    }

    pub fn set_quality(&mut self, quality: u8) -> bool {
        self.options.set_quality(quality)
    }

    pub fn pending(&self) -> &PendingList {
        &self.pending
    }

    pub fn results(&self) -> &ResultsView {
        &self.results
    }

    pub fn urls(&self) -> &ObjectUrlRegistry {
        &self.urls
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn state(&self) -> RoundState {
        self.round.state()
    }

    /// Runs one conversion round over every pending file.
    ///
    /// Previous results are dropped when the round starts; the pending list is
    /// left untouched whatever the outcome. Returns the number of results.
    pub async fn submit(&mut self, client: &ConverterClient, cancel: &CancellationToken) -> Result<usize, ConvertError> {
        if let Err(e) = pipeline::preflight(self.pending.items()) {
            self.notice = Some(Notice::for_error(&e));
            return Err(e);
        }
        self.round.begin()?;
        self.notice = None;
        tracing::info!(
            "Submitting {} file(s), {}",
            self.pending.len(),
            HumanBytes(self.pending.total_size())
        );
        self.results.clear(&mut self.urls);

        if let Err(e) = self.store.save(&self.options) {
            tracing::warn!("Failed to persist options: {}", e);
        }

        let request = BatchRequest::build(&self.config.files_field, self.pending.items(), &self.options);
        let outcome = pipeline::run_round(
            client,
            &self.config.endpoint,
            request,
            &mut self.round,
            &mut self.progress,
            cancel,
        )
        .await;

        match outcome {
            Ok(output) => {
                let count = output.entries.len();
                self.results
                    .populate(output.archive, &self.config.archive_name, output.entries, &mut self.urls);
                self.round.finish();
                tracing::info!("Conversion finished with {} result(s)", count);
                Ok(count)
            }
            Err(e) => {
                self.round.fail();
                tracing::error!("Conversion failed: {}", e);
                self.notice = Some(Notice::for_error(&e));
                Err(e)
            }
        }
    }

    pub fn view(&self) -> WidgetView {
        WidgetView {
            state: self.round.state(),
            options: self.options,
            drop_active: self.normalizer.drop_active(),
            pending: self.pending.rows(),
            results: self.results.rows().to_vec(),
            download_all: self.results.download_all().cloned(),
            notice: self.notice.clone(),
            progress_visible: self.progress.is_visible(),
            submit_enabled: self.round.submit_enabled(),
        }
    }
}
