//! Command-line entry point for working with boards on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kurbo::{Point, Size};
use sparkboard_core::{
    Canvas, CanvasConfig, CanvasError, CanvasEvent, ConfigError, Content, FileStore, Item, ItemKind,
    ItemStore, LayoutPolicy, NewItem, StoreError,
};

/// How long to wait for the store before giving up.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Canvas(#[from] CanvasError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to load board {board}: {message}")]
    Load { board: String, message: String },
    #[error("failed to add item: {0}")]
    Add(String),
    #[error("failed to update item {id}: {message}")]
    Write { id: String, message: String },
    #[error("failed to encode item: {0}")]
    Encode(String),
    #[error("unknown layout policy `{0}` (expected grid, by-type or smart)")]
    UnknownPolicy(String),
    #[error("timed out waiting for the store")]
    Timeout,
    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "sparkboard", about = "Arrange and edit Sparkboard mood boards")]
struct Cli {
    /// Directory holding board files.
    #[arg(long, global = true, env = "SPARKBOARD_STORE")]
    store: Option<PathBuf>,

    /// JSON canvas configuration file.
    #[arg(long, global = true, env = "SPARKBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Print items as JSON records.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List boards in the store.
    Boards,
    /// Show a board's items.
    List { board: String },
    /// Add a text note.
    AddNote {
        board: String,
        text: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },
    /// Add an image by URL.
    AddImage {
        board: String,
        url: String,
        #[arg(long, default_value_t = 0.0)]
        x: f64,
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },
    /// Move an item.
    Move { board: String, id: String, x: f64, y: f64 },
    /// Resize an item.
    Resize {
        board: String,
        id: String,
        width: f64,
        height: f64,
    },
    /// Delete an item.
    Delete { board: String, id: String },
    /// Rearrange every item: grid, by-type or smart.
    Organize {
        board: String,
        policy: String,
        /// Viewport width in screen pixels.
        #[arg(long, default_value_t = 1280.0)]
        width: f64,
        /// Viewport height in screen pixels.
        #[arg(long, default_value_t = 800.0)]
        height: f64,
    },
}

impl Command {
    fn board(&self) -> Option<&str> {
        match self {
            Command::Boards => None,
            Command::List { board }
            | Command::AddNote { board, .. }
            | Command::AddImage { board, .. }
            | Command::Move { board, .. }
            | Command::Resize { board, .. }
            | Command::Delete { board, .. }
            | Command::Organize { board, .. } => Some(board),
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn open_store(cli: &Cli) -> Result<FileStore, CliError> {
    let store = match &cli.store {
        Some(path) => FileStore::new(path.clone())?,
        None => FileStore::default_location()?,
    };
    log::debug!("Using board store at {}", store.base_path().display());
    Ok(store)
}

fn run(cli: Cli) -> Result<String, CliError> {
    let store = Arc::new(open_store(&cli)?);
    let Some(board) = cli.command.board().map(str::to_string) else {
        let mut out = String::new();
        for board in store.list_boards()? {
            out.push_str(&board);
            out.push('\n');
        }
        return Ok(out);
    };

    let config = match &cli.config {
        Some(path) => CanvasConfig::load(path)?,
        None => CanvasConfig::default(),
    };
    execute(store, config, &board, cli.command, cli.json)
}

/// Apply one board command and render the resulting items.
fn execute(
    store: Arc<dyn ItemStore>,
    config: CanvasConfig,
    board: &str,
    command: Command,
    json: bool,
) -> Result<String, CliError> {
    let mut canvas = Canvas::new(store, config);
    canvas.load(board)?;
    settle(&mut canvas)?;

    match command {
        Command::Boards | Command::List { .. } => {}
        Command::AddNote { text, title, x, y, .. } => {
            canvas.add_item(NewItem::new(Content::Note { text, title }, Point::new(x, y)))?;
        }
        Command::AddImage { url, x, y, .. } => {
            canvas.add_item(NewItem::new(Content::Image { url }, Point::new(x, y)))?;
        }
        Command::Move { id, x, y, .. } => canvas.apply_move(&id, Point::new(x, y))?,
        Command::Resize { id, width, height, .. } => canvas.apply_resize(&id, Size::new(width, height))?,
        Command::Delete { id, .. } => canvas.apply_delete(&id)?,
        Command::Organize { policy, width, height, .. } => {
            let policy = LayoutPolicy::from_name(&policy).ok_or(CliError::UnknownPolicy(policy))?;
            let region = canvas.visible_region(Size::new(width, height));
            let moved = canvas.organize(policy, region)?;
            log::info!("Organized {} items", moved);
        }
    }
    settle(&mut canvas)?;

    if json {
        let records = canvas
            .items()
            .map(|item| item.to_record(board))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CliError::Encode(e.to_string()))?;
        let mut out = serde_json::to_string_pretty(&records)?;
        out.push('\n');
        Ok(out)
    } else {
        Ok(canvas.items().map(describe).collect())
    }
}

/// Wait for the store, then fail on the first refused load or write.
fn settle(canvas: &mut Canvas) -> Result<(), CliError> {
    if !canvas.flush(FLUSH_TIMEOUT) {
        return Err(CliError::Timeout);
    }
    for event in canvas.poll_events() {
        match event {
            CanvasEvent::LoadFailed { board_id, message } => {
                return Err(CliError::Load { board: board_id, message });
            }
            CanvasEvent::AddFailed { message } => return Err(CliError::Add(message)),
            CanvasEvent::WriteFailed { id, message } => return Err(CliError::Write { id, message }),
            _ => {}
        }
    }
    Ok(())
}

/// One line per item: id, kind, geometry, label.
fn describe(item: &Item) -> String {
    let label = match &item.content {
        Content::Note { text, title: Some(title) } => format!("{title}: {text}"),
        Content::Note { text, title: None } => text.clone(),
        Content::Music { music, .. } if !music.artists.is_empty() => music.artist_line(),
        Content::File { file, .. } => file.file_name.clone(),
        other => other.url().unwrap_or_default().to_string(),
    };
    format!(
        "{}\t{}\t{},{}\t{}x{}\t{}\n",
        item.id(),
        kind_name(item.kind()),
        item.position.x,
        item.position.y,
        item.size.width,
        item.size.height,
        label
    )
}

fn kind_name(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Image => "image",
        ItemKind::Note => "note",
        ItemKind::Audio => "audio",
        ItemKind::Music => "music",
        ItemKind::File => "file",
    }
}
