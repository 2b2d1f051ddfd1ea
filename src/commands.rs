use anyhow::{bail, Context, Result};
use bytes::Bytes;
use indicatif::HumanBytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::TargetFormat;
use crate::client::{ConverterClient, SingleOutput};
use crate::input::{self, ClipboardItem, FileLike, InputEvent};
use crate::options::{ConversionOptions, FileStore, KeyValueStore, MemoryStore, OptionsStore};
use crate::progress::ProgressIndicator;
use crate::utils::{get_unique_filepath, sanitize_filename};
use crate::widget::{BatchWidget, InputOutcome, Notice, WidgetConfig, WidgetView};

/// Where the conversion options live between runs.
#[derive(Debug, Clone)]
pub struct Settings {
    pub path: Option<PathBuf>,
    pub persist: bool,
}

impl Settings {
    fn open(&self) -> Box<dyn KeyValueStore> {
        if !self.persist {
            return Box::new(MemoryStore::new());
        }
        match self.path.clone().or_else(FileStore::default_path) {
            Some(path) => Box::new(FileStore::open(path)),
            None => {
                tracing::warn!("Could not determine a settings directory; options will not be saved");
                Box::new(MemoryStore::new())
            }
        }
    }

    fn options_store(&self) -> OptionsStore {
        OptionsStore::new(self.open())
    }
}

pub struct ImageJob {
    pub files: Vec<String>,
    pub drop: Vec<PathBuf>,
    pub paste: bool,
    pub format: Option<TargetFormat>,
    pub quality: Option<u8>,
    pub output: PathBuf,
    pub keep_archive: bool,
}

/// Cancels `token` on Ctrl-C until the returned handle is aborted.
fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling...");
            token.cancel();
        }
    })
}

/// Ctrl-C routing for a whole session: cancels the round in flight, or ends
/// the session when no round is running.
#[derive(Clone, Default)]
struct Interrupts {
    round: Arc<Mutex<Option<CancellationToken>>>,
    quit: CancellationToken,
}

impl Interrupts {
    fn watch(&self) -> JoinHandle<()> {
        let interrupts = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !interrupts.interrupt().await {
                    break;
                }
            }
        })
    }

    /// Returns `false` once the session has been told to end.
    async fn interrupt(&self) -> bool {
        let current = self.round.lock().await.take();
        match current {
            Some(token) => {
                eprintln!("Cancelling...");
                token.cancel();
                true
            }
            None => {
                self.quit.cancel();
                false
            }
        }
    }

    async fn begin_round(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.round.lock().await = Some(token.clone());
        token
    }

    async fn end_round(&self) {
        self.round.lock().await.take();
    }
}

fn new_widget(settings: &Settings) -> BatchWidget {
    let mut widget = BatchWidget::new(
        WidgetConfig::image_converter(),
        settings.options_store(),
        ProgressIndicator::new(),
    );
    widget.init();
    widget
}

fn report_input(outcome: &InputOutcome) {
    if !outcome.rejected.is_empty() {
        eprintln!("Skipped (not an image): {}", outcome.rejected.join(", "));
    }
}

fn print_pending(view: &WidgetView) {
    if view.pending.is_empty() {
        println!("No files staged.");
        return;
    }
    println!("Staged files ({}):", view.pending.len());
    for row in &view.pending {
        println!("{}", row);
    }
}

fn print_results(view: &WidgetView) {
    for row in &view.results {
        println!("  {}", row);
    }
    if let Some(all) = &view.download_all {
        println!("  all: {} [{}]", all.filename, all.url);
    }
}

async fn read_clipboard() -> Result<ClipboardItem> {
    let mut buf = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut buf)
        .await
        .context("Failed to read pasted data from stdin")?;
    Ok(ClipboardItem::from_bytes(Bytes::from(buf)))
}

async fn convert_round(widget: &mut BatchWidget, client: &ConverterClient) -> Result<usize> {
    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let result = widget.submit(client, &cancel).await;
    watcher.abort();
    Ok(result?)
}

pub async fn run_images(client: ConverterClient, settings: Settings, job: ImageJob) -> Result<()> {
    let mut widget = new_widget(&settings);
    if let Some(format) = job.format {
        widget.set_format(format);
    }
    if let Some(quality) = job.quality {
        if !widget.set_quality(quality) {
            bail!("Quality must be between 1 and 100, got {}", quality);
        }
    }

    if !job.files.is_empty() {
        let picked = input::load_picker(&job.files).await?;
        report_input(&widget.handle_input(InputEvent::PickerSelected(picked)));
    }
    if !job.drop.is_empty() {
        widget.handle_input(InputEvent::DragEnter);
        let dropped = input::load_dropped(&job.drop).await?;
        report_input(&widget.handle_input(InputEvent::Drop(dropped)));
    }
    if job.paste {
        let item = read_clipboard().await?;
        report_input(&widget.handle_input(InputEvent::Paste(vec![item])));
    }

    let view = widget.view();
    print_pending(&view);
    println!(
        "Converting to {} (quality {})...",
        view.options.target_format, view.options.quality
    );

    let outcome = convert_round(&mut widget, &client).await;
    let saved = match outcome {
        Ok(count) => {
            println!("Converted {} file(s):", count);
            print_results(&widget.view());
            widget
                .results()
                .save_to(&job.output, job.keep_archive, widget.urls())
                .await
                .context("Failed to save results")
        }
        Err(e) => Err(e).context("Conversion failed"),
    };
    widget.teardown();

    for path in saved? {
        println!("Saved {}", path.display());
    }
    Ok(())
}

async fn save_single(output: &Path, result: &SingleOutput) -> Result<PathBuf> {
    fs::create_dir_all(output)
        .await
        .context("Failed to create output directory")?;
    let path = get_unique_filepath(output, &sanitize_filename(&result.filename));
    fs::write(&path, &result.data)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    Ok(path)
}

pub async fn run_docx(client: ConverterClient, file: PathBuf, output: PathBuf) -> Result<()> {
    let document = FileLike::from_path(&file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    println!("Converting {} ({})...", document.name, HumanBytes(document.size()));

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let result = client.docx_to_pdf(&document, &cancel).await;
    watcher.abort();

    let result = result.context("Conversion failed")?;
    let path = save_single(&output, &result).await?;
    println!("Saved {} ({})", path.display(), HumanBytes(result.data.len() as u64));
    Ok(())
}

pub async fn run_resize(
    client: ConverterClient,
    file: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
    output: PathBuf,
) -> Result<()> {
    let image = FileLike::from_path(&file)
        .await
        .with_context(|| format!("Failed to read {:?}", file))?;
    if !image.is_in_family("image/") {
        bail!("{} is not an image ({})", image.name, image.media_type);
    }

    let cancel = CancellationToken::new();
    let watcher = cancel_on_ctrl_c(cancel.clone());
    let result = client.resize(&image, width, height, &cancel).await;
    watcher.abort();

    let result = result.context("Resize failed")?;
    let path = save_single(&output, &result).await?;
    println!("Saved {} ({})", path.display(), result.media_type);
    Ok(())
}

pub async fn run_units(client: ConverterClient, value: f64, from: String, to: String) -> Result<()> {
    let result = client
        .convert_units(value, &from, &to)
        .await
        .context("Unit conversion failed")?;
    println!("{}", result);
    Ok(())
}

pub async fn run_currency(client: ConverterClient, value: f64, from: String, to: String) -> Result<()> {
    let result = client
        .convert_currency(value, &from, &to)
        .await
        .context("Currency conversion failed")?;
    println!("{}", result);
    Ok(())
}

/// Shows the persisted options, updating them first when values are given.
pub fn run_options(settings: Settings, format: Option<TargetFormat>, quality: Option<u8>) -> Result<()> {
    let mut store = settings.options_store();
    let mut options = ConversionOptions::default();
    store.load(&mut options);

    if format.is_some() || quality.is_some() {
        if let Some(format) = format {
            options.target_format = format;
        }
        if let Some(quality) = quality {
            if !options.set_quality(quality) {
                bail!("Quality must be between 1 and 100, got {}", quality);
            }
        }
        store.save(&options).context("Failed to save options")?;
    }

    println!("format:  {}", options.target_format);
    println!("quality: {}", options.quality);
    Ok(())
}

const SESSION_HELP: &str = "\
commands:
  add <path|glob>...   stage files from the picker
  drop <path>...       drop files or folders
  paste <path>         paste raw bytes from a file as clipboard content
  rm <n>|#<id>         remove the n-th staged file, or the one with that id
  clear                remove every staged file
  ls                   list staged files and results
  format <fmt>         jpeg, png, webp, tiff or bmp
  quality <1-100>      output quality
  convert              convert every staged file
  save [dir]           save the latest results
  quit                 leave the session (or Ctrl-C while no conversion runs)";

/// Interactive session: one widget living across many rounds.
pub async fn run_session(client: ConverterClient, settings: Settings, output: PathBuf) -> Result<()> {
    let mut widget = new_widget(&settings);
    println!("rconv session; type 'help' for commands");

    let interrupts = Interrupts::default();
    let watcher = interrupts.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = interrupts.quit.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        let step = session_step(&mut widget, &client, &interrupts, &output, command, &args).await;
        match step {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("Error: {:#}", e),
        }
        if let Some(Notice::Info(message)) = widget.notice() {
            eprintln!("{}", message);
        }
    }

    watcher.abort();
    let revoked = widget.teardown();
    tracing::debug!("Session closed ({} stray handles)", revoked);
    Ok(())
}

async fn session_step(
    widget: &mut BatchWidget,
    client: &ConverterClient,
    interrupts: &Interrupts,
    output: &Path,
    command: &str,
    args: &[String],
) -> Result<bool> {
    match command {
        "help" | "?" => println!("{}", SESSION_HELP),
        "add" => {
            let picked = input::load_picker(args).await?;
            report_input(&widget.handle_input(InputEvent::PickerSelected(picked)));
            print_pending(&widget.view());
        }
        "drop" => {
            let paths: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
            widget.handle_input(InputEvent::DragEnter);
            let dropped = match input::load_dropped(&paths).await {
                Ok(dropped) => dropped,
                Err(e) => {
                    widget.handle_input(InputEvent::DragLeave);
                    return Err(e.into());
                }
            };
            report_input(&widget.handle_input(InputEvent::Drop(dropped)));
            print_pending(&widget.view());
        }
        "paste" => {
            let Some(path) = args.first() else {
                bail!("usage: paste <path>");
            };
            let data = fs::read(path)
                .await
                .with_context(|| format!("Failed to read {}", path))?;
            let item = ClipboardItem::from_bytes(Bytes::from(data));
            report_input(&widget.handle_input(InputEvent::Paste(vec![item])));
            print_pending(&widget.view());
        }
        "rm" => {
            let target = args.first().context("usage: rm <n>|#<id>")?;
            let removed = if let Some(id) = target.strip_prefix('#') {
                let id: u64 = id.parse().context("usage: rm #<id>")?;
                widget.remove_id(id)
            } else {
                let index: usize = target
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .context("usage: rm <n>")?;
                widget.remove(index - 1)
            };
            match removed {
                Some(removed) => println!("Removed {}", removed.name()),
                None => println!("No staged file matches {}", target),
            }
        }
        "clear" => {
            widget.clear();
            println!("Cleared.");
        }
        "ls" => {
            let view = widget.view();
            println!(
                "state: {} | format {} quality {} | convert {}",
                view.state,
                view.options.target_format,
                view.options.quality,
                if view.submit_enabled { "ready" } else { "busy" }
            );
            print_pending(&view);
            if !view.results.is_empty() {
                println!("Results ({}):", view.results.len());
                print_results(&view);
            }
        }
        "format" => {
            let format: TargetFormat = args
                .first()
                .context("usage: format <fmt>")?
                .parse()
                .map_err(anyhow::Error::msg)?;
            widget.set_format(format);
        }
        "quality" => {
            let quality: u8 = args
                .first()
                .and_then(|q| q.parse().ok())
                .context("usage: quality <1-100>")?;
            if !widget.set_quality(quality) {
                bail!("Quality must be between 1 and 100");
            }
        }
        "convert" => {
            let cancel = interrupts.begin_round().await;
            let result = widget.submit(client, &cancel).await;
            interrupts.end_round().await;
            let count = result?;
            println!("Converted {} file(s):", count);
            print_results(&widget.view());
        }
        "save" => {
            let dir = args.first().map(PathBuf::from).unwrap_or_else(|| output.to_path_buf());
            let saved = widget.results().save_to(&dir, true, widget.urls()).await?;
            for path in saved {
                println!("Saved {}", path.display());
            }
        }
        "quit" | "exit" => return Ok(true),
        other => println!("Unknown command '{}'; type 'help'", other),
    }
    Ok(false)
}
