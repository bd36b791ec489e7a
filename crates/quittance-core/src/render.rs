use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::coverage::MonthSlot;
use crate::rental::Rental;
use crate::session::CoverageSession;

const GRID_COLUMNS: usize = 4;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color")?.unwrap_or(true);

        Ok(Self { color })
    }

    #[tracing::instrument(skip(self, rentals))]
    pub fn print_rental_table(&mut self, rentals: &[Rental]) -> anyhow::Result<()> {
        let headers = ["ID", "Kind", "Start", "Covered to", "Paid", "Label"]
            .map(str::to_string)
            .to_vec();

        let rows = rentals
            .iter()
            .map(|rental| {
                let covered = rental
                    .end_date
                    .map(|date| date.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let paid = if rental.paid {
                    self.paint("yes", "32")
                } else {
                    "no".to_string()
                };
                vec![
                    self.paint(&rental.id.to_string(), "33"),
                    rental.kind.to_string(),
                    rental.start_date.format("%Y-%m-%d").to_string(),
                    covered,
                    paid,
                    rental.label.clone(),
                ]
            })
            .collect();

        write_table(io::stdout().lock(), headers, rows)
    }

    #[tracing::instrument(skip(self, rental))]
    pub fn print_rental_info(&mut self, rental: &Rental) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();

        writeln!(out, "id        {}", rental.id)?;
        writeln!(out, "uuid      {}", rental.uuid)?;
        writeln!(out, "label     {}", rental.label)?;
        writeln!(out, "kind      {}", rental.kind)?;
        writeln!(out, "start     {}", rental.start_date.format("%Y-%m-%d"))?;
        if let Some(end) = rental.end_date {
            writeln!(out, "covered   {}", end.format("%Y-%m-%d"))?;
        }
        writeln!(out, "paid      {}", if rental.paid { "yes" } else { "no" })?;
        writeln!(out, "entry     {}", rental.entry.format("%Y-%m-%dT%H:%M:%SZ"))?;
        writeln!(out, "modified  {}", rental.modified.format("%Y-%m-%dT%H:%M:%SZ"))?;

        for (key, value) in &rental.extra {
            writeln!(out, "{key:<9} {value}")?;
        }

        Ok(())
    }

    /// Prints the page of the grid the session is showing.
    #[tracing::instrument(skip(self, session))]
    pub fn print_coverage_page(&mut self, session: &CoverageSession) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let pager = session.pager();
        let rental = session.rental();

        writeln!(
            out,
            "{} (#{}) page {}/{}",
            rental.label,
            rental.id,
            pager.current() + 1,
            pager.total().max(1)
        )?;

        let cells: Vec<String> = session
            .visible()
            .iter()
            .enumerate()
            .map(|(idx, slot)| self.grid_cell(idx + 1, slot))
            .collect();

        for row in cells.chunks(GRID_COLUMNS) {
            writeln!(out, "  {}", row.join("  "))?;
        }

        match session.preview() {
            Ok(end) => writeln!(out, "covered through {}", end.format("%Y-%m-%d"))?,
            Err(_) => writeln!(out, "no month covered")?,
        }

        Ok(())
    }

    fn grid_cell(&self, position: usize, slot: &MonthSlot) -> String {
        let label = format!("{position:>2} {}", slot.date.format("%Y-%m"));
        if slot.selected {
            self.paint(&format!("[x] {label}"), "32")
        } else {
            format!("[ ] {label}")
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(visible_width(cell));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, &width) in row.iter().zip(&widths) {
            let padding = width.saturating_sub(visible_width(cell));
            write!(writer, "{cell}{} ", " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn visible_width(cell: &str) -> usize {
    UnicodeWidthStr::width(strip_ansi(cell).as_str())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            escaped = ch != 'm';
            continue;
        }
        if ch == '\x1b' {
            escaped = true;
            continue;
        }
        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_pads_to_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID".to_string(), "Label".to_string()],
            vec![
                vec!["\x1b[33m1\x1b[0m".to_string(), "Studio Bellecour".to_string()],
                vec!["12".to_string(), "T2".to_string()],
            ],
        )
        .expect("write table");

        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Label            ");
        assert_eq!(lines[1], "-- ---------------- ");
        assert_eq!(lines[3], "12 T2               ");
    }

    #[test]
    fn color_setting_is_validated() {
        let mut cfg = Config::default();
        assert!(Renderer::new(&cfg).expect("default").color);

        cfg.apply_overrides([("rc.color".to_string(), "off".to_string())]);
        assert!(!Renderer::new(&cfg).expect("off").color);

        cfg.apply_overrides([("color".to_string(), "sometimes".to_string())]);
        let err = Renderer::new(&cfg).expect_err("invalid");
        assert!(err.to_string().contains("color must be on or off"));
    }

    #[test]
    fn strips_escape_sequences() {
        assert_eq!(strip_ansi("\x1b[32myes\x1b[0m"), "yes");
    }
}
