//! Plain-text table rendering of snapshots.

use std::io::{self, Write};

use gridstat_core::Snapshot;

use crate::formats::FormatSet;

/// Width of the leading instance/device column.
const INSTANCE_WIDTH: usize = 20;

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

const NO_DATA: &str = "No data available";

/// Header repeat used when the terminal height is unknown.
pub const DEFAULT_HEADER_EVERY: usize = 20;

/// Header repeat for a terminal `height` rows tall: the header plus one
/// spare line stay on screen.
pub fn header_every_for_height(height: Option<u16>) -> usize {
    match height {
        Some(h) if h > 2 => usize::from(h) - 2,
        Some(_) => 1,
        None => DEFAULT_HEADER_EVERY,
    }
}

/// [`header_every_for_height`] for the controlling terminal.
pub fn terminal_header_every() -> usize {
    header_every_for_height(crossterm::terminal::size().ok().map(|(_, rows)| rows))
}

/// What a poll produced, handed to the renderer.
#[derive(Debug, Clone, Copy)]
pub enum PollOutcome<'a> {
    /// A snapshot fetched on this poll.
    Fresh(&'a Snapshot),
    /// The fetch failed; `last` is the last good snapshot, if any.
    Stale {
        last: Option<&'a Snapshot>,
        error: &'a str,
    },
}

/// Receives every poll outcome from the stat poller.
pub trait Renderer {
    fn render(&mut self, formats: &FormatSet, outcome: PollOutcome<'_>) -> io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Add a row per device under each host.
    pub show_devices: bool,
    /// Redraw the whole screen each poll instead of scrolling.
    pub top: bool,
    /// In scrolling mode, repeat the header after this many rows.
    pub header_every: usize,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            show_devices: false,
            top: false,
            header_every: DEFAULT_HEADER_EVERY,
        }
    }
}

/// Renders snapshots as fixed-width rows, one per host.
pub struct TableRenderer<W> {
    out: W,
    options: TableOptions,
    /// Rows printed since the header was last printed; `None` before the first header.
    rows_since_header: Option<usize>,
}

impl<W: Write> TableRenderer<W> {
    pub fn new(out: W, options: TableOptions) -> Self {
        Self {
            out,
            options,
            rows_since_header: None,
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn header_due(&self) -> bool {
        match self.rows_since_header {
            None => true,
            Some(rows) => rows >= self.options.header_every,
        }
    }

    fn write_lines(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    fn draw_screen(&mut self, formats: &FormatSet, snapshot: Option<&Snapshot>) -> io::Result<()> {
        write!(self.out, "{CLEAR_SCREEN}")?;
        writeln!(self.out, "{}", header_line(formats))?;
        if let Some(snapshot) = snapshot {
            let rows = table_rows(formats, snapshot, self.options.show_devices);
            self.write_lines(&rows)?;
        }
        Ok(())
    }
}

impl<W: Write> Renderer for TableRenderer<W> {
    fn render(&mut self, formats: &FormatSet, outcome: PollOutcome<'_>) -> io::Result<()> {
        match outcome {
            PollOutcome::Fresh(snapshot) if self.options.top => {
                self.draw_screen(formats, Some(snapshot))?;
            }
            PollOutcome::Fresh(snapshot) if snapshot.hosts().is_empty() => {
                writeln!(self.out, "{NO_DATA}")?;
            }
            PollOutcome::Fresh(snapshot) => {
                let rows = table_rows(formats, snapshot, self.options.show_devices);
                if self.header_due() {
                    writeln!(self.out, "{}", header_line(formats))?;
                    self.rows_since_header = Some(0);
                }
                self.write_lines(&rows)?;
                self.rows_since_header = self.rows_since_header.map(|n| n + rows.len());
            }
            PollOutcome::Stale { last, error } if self.options.top => {
                self.draw_screen(formats, last)?;
                writeln!(self.out, "stale: {error}")?;
            }
            // Scrolling mode keeps the last printed rows; the failure is logged.
            PollOutcome::Stale { .. } => {}
        }
        self.out.flush()
    }
}

/// Column headers: instance, then each format's shorthand.
pub fn header_line(formats: &FormatSet) -> String {
    let cells: Vec<String> = formats
        .iter()
        .map(|f| format!("{:>width$}", f.shorthand, width = f.value_kind.width()))
        .collect();
    format!("{:>INSTANCE_WIDTH$} : {}", "instance", cells.join(" "))
}

/// Body rows for `snapshot`, hosts sorted, devices under their host.
///
/// A format whose metric is missing for a host shows `NA`; device cells
/// for metrics without that device are blank.
pub fn table_rows(formats: &FormatSet, snapshot: &Snapshot, show_devices: bool) -> Vec<String> {
    let hosts = snapshot.hosts();
    if hosts.is_empty() {
        return vec![NO_DATA.to_string()];
    }

    let mut rows = Vec::new();
    for host in hosts {
        let cells: Vec<String> = formats
            .iter()
            .map(|f| {
                let kind = f.value_kind;
                let text = snapshot
                    .instance(&f.name, host)
                    .map(|agg| kind.format(kind.summary(agg)))
                    .unwrap_or_else(|| "NA".to_string());
                format!("{:>width$}", text, width = kind.width())
            })
            .collect();
        rows.push(format!("{:>INSTANCE_WIDTH$} : {}", host, cells.join(" ")));

        if !show_devices {
            continue;
        }
        for device in snapshot.devices_for(host) {
            let cells: Vec<String> = formats
                .iter()
                .map(|f| {
                    let kind = f.value_kind;
                    let text = snapshot
                        .instance(&f.name, host)
                        .and_then(|agg| agg.devices.get(device))
                        .map(|v| kind.format(*v))
                        .unwrap_or_default();
                    format!("{:>width$}", text, width = kind.width())
                })
                .collect();
            rows.push(format!("{:>INSTANCE_WIDTH$} : {}", device, cells.join(" ")));
        }
    }
    rows
}
