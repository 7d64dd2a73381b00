//! Console rendering for the `run` command
//!
//! Watches the monitor's slices and prints every change to stdout in the
//! selected [`OutputFormat`]. Diagram markup can additionally be mirrored to
//! SVG files: `<diagram>.svg` holds the raw markup, `<diagram>.view.svg` the
//! markup as seen through the diagram's viewport.
//!
//! Lines read from stdin are parsed as [`ConsoleCommand`]s and forwarded to
//! the monitor.

use crate::monitor::{MonitorEvent, MonitorHandle, MonitorView};
use crate::protocol::{BreakpointList, FuzzerStats};
use crate::transport::mqtt::ConnectionStatus;
use crate::viewport::{Diagram, Point, Rect, Tool, Viewport, ViewportAction};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

const RESET: &str = "\x1b[0m";

/// Output formatting options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Color-coded, human-readable with timestamps (default)
    Pretty,
    /// Single line per update, minimal formatting
    Compact,
    /// One JSON object per line for programmatic processing
    Json,
}

/// One observed change
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Status(ConnectionStatus),
    Stats(FuzzerStats),
    Breakpoints(BreakpointList),
    Markup { diagram: Diagram, bytes: usize },
    Viewport { diagram: Diagram, viewport: Viewport },
}

impl Update {
    fn label(&self) -> &'static str {
        match self {
            Update::Status(_) => "STATUS",
            Update::Stats(_) => "STATS",
            Update::Breakpoints(_) => "BREAKPOINTS",
            Update::Markup { .. } => "DIAGRAM",
            Update::Viewport { .. } => "VIEWPORT",
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Update::Status(ConnectionStatus::Connected) => "\x1b[1;32m", // Green
            Update::Status(ConnectionStatus::ConnectionError) => "\x1b[1;31m", // Red
            Update::Status(_) => "\x1b[1;33m",                           // Yellow
            Update::Stats(_) => "\x1b[1;36m",                            // Cyan
            Update::Breakpoints(_) => "\x1b[1;35m",                      // Magenta
            Update::Markup { .. } | Update::Viewport { .. } => "\x1b[1;34m", // Blue
        }
    }

    fn summary(&self) -> String {
        match self {
            Update::Status(status) => status.to_string(),
            Update::Stats(stats) => format!(
                "coverage={} runs={} crashes={} timeouts={} runs/s={:.1}",
                stats.coverage, stats.runs, stats.crashes, stats.timeouts, stats.runs_per_sec
            ),
            Update::Breakpoints(list) if list.is_empty() => "none".to_string(),
            Update::Breakpoints(list) => list
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            Update::Markup { diagram, bytes } => format!("{diagram} updated ({bytes} bytes)"),
            Update::Viewport { diagram, viewport } => format!(
                "{diagram} scale={:.3} translate=({:.1}, {:.1}) tool={:?} viewer={}x{}",
                viewport.transform.scale,
                viewport.transform.translate_x,
                viewport.transform.translate_y,
                viewport.tool,
                viewport.viewer.width,
                viewport.viewer.height
            ),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Update::Status(status) => json!({ "status": status.label() }),
            Update::Stats(stats) => json!({ "stats": stats }),
            Update::Breakpoints(list) => json!({ "breakpoints": list }),
            Update::Markup { diagram, bytes } => json!({ "diagram": diagram, "bytes": bytes }),
            Update::Viewport { diagram, viewport } => {
                json!({ "diagram": diagram, "viewport": viewport })
            }
        }
    }
}

/// Render one update as a line (pure function)
pub fn format_update(update: &Update, format: OutputFormat) -> String {
    let timestamp = chrono::Utc::now().format("%H:%M:%S");
    let label = update.label();

    match format {
        OutputFormat::Json => {
            let mut value = update.to_json();
            if let Some(object) = value.as_object_mut() {
                object.insert("timestamp".to_string(), json!(timestamp.to_string()));
                object.insert("kind".to_string(), json!(label.to_lowercase()));
            }
            value.to_string()
        }
        OutputFormat::Compact => format!("{timestamp} [{label}] {}", update.summary()),
        OutputFormat::Pretty => {
            let color = update.color_code();
            format!("{color}[{label}]{RESET} {timestamp} {}", update.summary())
        }
    }
}

/// Wrap diagram markup so it renders through a viewport (pure function)
///
/// Any XML declaration, DOCTYPE or leading comment is dropped first so the
/// diagram's root element can be nested.
pub fn apply_viewport(markup: &str, viewport: &Viewport) -> String {
    let markup = strip_prolog(markup);
    let t = &viewport.transform;
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\">\
         <g transform=\"matrix({} 0 0 {} {} {})\">{}</g></svg>",
        viewport.viewer.width,
        viewport.viewer.height,
        t.scale,
        t.scale,
        t.translate_x,
        t.translate_y,
        markup
    )
}

/// Skip the XML prolog ahead of the root element
///
/// An unterminated prolog item is left in place.
pub fn strip_prolog(markup: &str) -> &str {
    let mut rest = markup.trim_start();
    loop {
        let skipped = if rest.starts_with("<?") {
            rest.find("?>").map(|end| &rest[end + 2..])
        } else if rest.starts_with("<!--") {
            rest.find("-->").map(|end| &rest[end + 3..])
        } else if rest.starts_with("<!DOCTYPE") || rest.starts_with("<!doctype") {
            doctype_len(rest).map(|end| &rest[end..])
        } else {
            None
        };
        match skipped {
            Some(next) => rest = next.trim_start(),
            None => return rest,
        }
    }
}

fn doctype_len(doctype: &str) -> Option<usize> {
    let close = doctype.find('>')?;
    match doctype.find('[') {
        // internal subset may contain '>'
        Some(open) if open < close => {
            let subset_end = open + doctype[open..].find(']')?;
            Some(subset_end + doctype[subset_end..].find('>')? + 1)
        }
        _ => Some(close + 1),
    }
}

/// Mirrors diagram markup into a directory
#[derive(Debug, Clone)]
pub struct SvgMirror {
    dir: PathBuf,
}

impl SvgMirror {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn raw_path(&self, diagram: Diagram) -> PathBuf {
        self.dir.join(format!("{diagram}.svg"))
    }

    pub fn view_path(&self, diagram: Diagram) -> PathBuf {
        self.dir.join(format!("{diagram}.view.svg"))
    }

    pub fn write_markup(&self, diagram: Diagram, markup: &str) -> io::Result<()> {
        write_atomically(&self.raw_path(diagram), markup)
    }

    pub fn write_view(&self, diagram: Diagram, markup: &str, viewport: &Viewport) -> io::Result<()> {
        write_atomically(&self.view_path(diagram), &apply_viewport(markup, viewport))
    }
}

fn write_atomically(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("svg.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

/// Prints updates and keeps the SVG mirror current
pub struct ConsoleRenderer<W: Write> {
    out: W,
    format: OutputFormat,
    mirror: Option<SvgMirror>,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, format: OutputFormat, mirror: Option<SvgMirror>) -> Self {
        Self {
            out,
            format,
            mirror,
        }
    }

    pub fn emit(&mut self, update: &Update) -> io::Result<()> {
        writeln!(self.out, "{}", format_update(update, self.format))?;
        self.out.flush()
    }

    fn refresh_view(&self, diagram: Diagram, markup: Option<&String>, viewport: &Viewport) {
        if let (Some(mirror), Some(markup)) = (&self.mirror, markup) {
            if let Err(e) = mirror.write_view(diagram, markup, viewport) {
                warn!(%diagram, error = %e, "Failed to write viewport SVG");
            }
        }
    }

    fn markup_changed(&mut self, diagram: Diagram, markup: Option<String>, viewport: &Viewport) -> io::Result<()> {
        let Some(markup) = markup else {
            return Ok(());
        };
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.write_markup(diagram, &markup) {
                warn!(%diagram, error = %e, "Failed to write diagram SVG");
            }
        }
        self.refresh_view(diagram, Some(&markup), viewport);
        self.emit(&Update::Markup {
            diagram,
            bytes: markup.len(),
        })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Render every change until `stop` flips or the monitor goes away
pub async fn run_console<W: Write>(
    mut view: MonitorView,
    renderer: &mut ConsoleRenderer<W>,
    mut stop: watch::Receiver<bool>,
) -> io::Result<()> {
    renderer.emit(&Update::Status(*view.status.borrow_and_update()))?;

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(());
                }
            }
            changed = view.status.changed() => {
                if changed.is_err() { return Ok(()); }
                let status = *view.status.borrow_and_update();
                renderer.emit(&Update::Status(status))?;
            }
            changed = view.store.stats.changed() => {
                if changed.is_err() { return Ok(()); }
                let stats = view.store.stats.borrow_and_update().clone();
                renderer.emit(&Update::Stats(stats))?;
            }
            changed = view.store.breakpoints.changed() => {
                if changed.is_err() { return Ok(()); }
                let list = view.store.breakpoints.borrow_and_update().clone();
                renderer.emit(&Update::Breakpoints(list))?;
            }
            changed = view.store.graph.changed() => {
                if changed.is_err() { return Ok(()); }
                let markup = view.store.graph.borrow_and_update().clone();
                let viewport = view.graph_viewport.borrow().clone();
                renderer.markup_changed(Diagram::Graph, markup, &viewport)?;
            }
            changed = view.store.coverage.changed() => {
                if changed.is_err() { return Ok(()); }
                let markup = view.store.coverage.borrow_and_update().clone();
                let viewport = view.coverage_viewport.borrow().clone();
                renderer.markup_changed(Diagram::Coverage, markup, &viewport)?;
            }
            changed = view.graph_viewport.changed() => {
                if changed.is_err() { return Ok(()); }
                let viewport = view.graph_viewport.borrow_and_update().clone();
                let markup = view.store.graph.borrow().clone();
                renderer.refresh_view(Diagram::Graph, markup.as_ref(), &viewport);
                renderer.emit(&Update::Viewport { diagram: Diagram::Graph, viewport })?;
            }
            changed = view.coverage_viewport.changed() => {
                if changed.is_err() { return Ok(()); }
                let viewport = view.coverage_viewport.borrow_and_update().clone();
                let markup = view.store.coverage.borrow().clone();
                renderer.refresh_view(Diagram::Coverage, markup.as_ref(), &viewport);
                renderer.emit(&Update::Viewport { diagram: Diagram::Coverage, viewport })?;
            }
        }
    }
}

/// Interactive command typed on stdin
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Connect,
    Disconnect,
    Publish { topic: String, message: String },
    Viewport { diagram: Diagram, action: ViewportAction },
    Resize { diagram: Diagram, width: f64, height: f64 },
    Quit,
}

/// Usage text for the interactive commands
pub const COMMAND_HELP: &str = "\
commands:
  connect | disconnect | quit
  publish <topic> <message>
  <graph|coverage> pan <dx> <dy>
  <graph|coverage> zoom <factor> [<x> <y>]
  <graph|coverage> wheel <delta> <x> <y>
  <graph|coverage> click <x> <y>
  <graph|coverage> tool <none|pan|zoom_in|zoom_out|auto>
  <graph|coverage> reset | fit | fit <x> <y> <width> <height>
  <graph|coverage> resize <width> <height>";

/// Parse one command line (pure function)
pub fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        ["connect"] => Ok(ConsoleCommand::Connect),
        ["disconnect"] => Ok(ConsoleCommand::Disconnect),
        ["quit"] | ["exit"] => Ok(ConsoleCommand::Quit),
        ["publish", topic, rest @ ..] if !rest.is_empty() => {
            // keep the message verbatim after the topic
            let message = line
                .trim_start()
                .strip_prefix("publish")
                .map(str::trim_start)
                .and_then(|s| s.strip_prefix(*topic))
                .map(str::trim)
                .unwrap_or_default();
            Ok(ConsoleCommand::Publish {
                topic: topic.to_string(),
                message: message.to_string(),
            })
        }
        [diagram, rest @ ..] => {
            let diagram = parse_diagram(diagram)?;
            parse_diagram_command(diagram, rest)
        }
        [] => Err("empty command".to_string()),
    }
}

fn parse_diagram(word: &str) -> Result<Diagram, String> {
    match word {
        "graph" | "cfg" => Ok(Diagram::Graph),
        "coverage" => Ok(Diagram::Coverage),
        other => Err(format!("unknown command or diagram '{other}'")),
    }
}

fn parse_tool(word: &str) -> Result<Tool, String> {
    match word {
        "none" => Ok(Tool::None),
        "pan" => Ok(Tool::Pan),
        "zoom_in" => Ok(Tool::ZoomIn),
        "zoom_out" => Ok(Tool::ZoomOut),
        "auto" => Ok(Tool::Auto),
        other => Err(format!("unknown tool '{other}'")),
    }
}

fn number(word: &str) -> Result<f64, String> {
    word.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("expected a number, got '{word}'"))
}

fn parse_diagram_command(diagram: Diagram, words: &[&str]) -> Result<ConsoleCommand, String> {
    let action = match words {
        ["pan", dx, dy] => ViewportAction::Pan {
            dx: number(dx)?,
            dy: number(dy)?,
        },
        ["zoom", factor] => ViewportAction::ZoomOnViewerCenter {
            factor: number(factor)?,
        },
        ["zoom", factor, x, y] => ViewportAction::Zoom {
            factor: number(factor)?,
            at: Point::new(number(x)?, number(y)?),
        },
        ["wheel", delta, x, y] => ViewportAction::Wheel {
            delta: number(delta)?,
            at: Point::new(number(x)?, number(y)?),
        },
        ["click", x, y] => ViewportAction::Click {
            at: Point::new(number(x)?, number(y)?),
        },
        ["tool", tool] => ViewportAction::SetTool {
            tool: parse_tool(tool)?,
        },
        ["reset"] => ViewportAction::Reset,
        ["fit"] => ViewportAction::FitToContent,
        ["fit", x, y, width, height] => ViewportAction::FitSelection {
            rect: Rect::new(number(x)?, number(y)?, number(width)?, number(height)?),
        },
        ["resize", width, height] => {
            return Ok(ConsoleCommand::Resize {
                diagram,
                width: number(width)?,
                height: number(height)?,
            })
        }
        _ => return Err(format!("unrecognized {diagram} command")),
    };
    Ok(ConsoleCommand::Viewport { diagram, action })
}

/// Read stdin lines on a dedicated thread
///
/// The thread blocks in `read_line` and is not joined; it ends with the
/// process, or when the receiver is dropped and the next line arrives.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<io::Result<String>>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("fuzzmon-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Forward console commands to the monitor until input ends or `quit`
pub async fn read_commands(
    handle: MonitorHandle,
    mut lines: mpsc::Receiver<io::Result<String>>,
) -> io::Result<()> {
    let publisher = handle.publisher();

    while let Some(line) = lines.recv().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}\n{COMMAND_HELP}");
                continue;
            }
        };
        debug!(?command, "Console command");

        match command {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Connect => {
                handle.connect();
            }
            ConsoleCommand::Disconnect => {
                handle.disconnect();
            }
            ConsoleCommand::Publish { topic, message } => publisher.publish(&topic, message),
            ConsoleCommand::Viewport { diagram, action } => {
                handle.send(MonitorEvent::Viewport { diagram, action });
            }
            ConsoleCommand::Resize {
                diagram,
                width,
                height,
            } => {
                handle.resize(diagram, width, height);
            }
        }
    }
    Ok(())
}
