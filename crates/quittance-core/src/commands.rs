use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{parse_date_expr, parse_month_token, to_project_date};
use crate::render::Renderer;
use crate::rental::{Rental, RentalKind, RentalRef};
use crate::session::CoverageSession;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "list", "info", "show", "pay", "undo", "_show", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &str, known: &[&'a str]) -> Option<&'a str> {
    if let Some(exact) = known.iter().copied().find(|name| *name == token) {
        return Some(exact);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, cfg, renderer, inv))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = to_project_date(now);
    let args = inv.command_args.as_slice();

    debug!(command = %inv.command, ?args, %today, "dispatching command");

    match inv.command.as_str() {
        "add" => cmd_add(store, args, now, today),
        "list" => cmd_list(store, renderer),
        "info" => cmd_info(store, renderer, args),
        "show" => cmd_show(store, cfg, renderer, args, today),
        "pay" => cmd_pay(store, cfg, renderer, args, now, today),
        "undo" => cmd_undo(store),
        "_show" => cmd_show_config(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Start(NaiveDate),
    End(NaiveDate),
    Kind(RentalKind),
}

fn parse_field(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Field>> {
    let Some((key, value)) = tok.split_once(':').or_else(|| tok.split_once('=')) else {
        return Ok(None);
    };

    match key.to_ascii_lowercase().as_str() {
        "start" => Ok(Some(Field::Start(parse_date_expr(value, today)?))),
        "end" => Ok(Some(Field::End(parse_date_expr(value, today)?))),
        "kind" | "type" => Ok(Some(Field::Kind(value.parse()?))),
        _ => Ok(None),
    }
}

#[instrument(skip(store, args, now, today))]
fn cmd_add(
    store: &mut DataStore,
    args: &[String],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command add");

    let mut label_parts = Vec::new();
    let mut start = None;
    let mut end = None;
    let mut kind = RentalKind::Rental;

    for arg in args {
        match parse_field(arg, today)? {
            Some(Field::Start(date)) => start = Some(date),
            Some(Field::End(date)) => end = Some(date),
            Some(Field::Kind(value)) => kind = value,
            None => label_parts.push(arg.as_str()),
        }
    }

    if label_parts.is_empty() {
        return Err(anyhow!("add: a label is required"));
    }
    let start = start.ok_or_else(|| anyhow!("add: start:<date> is required"))?;
    if let Some(end) = end
        && end < start
    {
        warn!(%start, %end, "end date precedes start; nothing will show as covered");
    }

    let rentals = store.load_rentals()?;
    let id = store.next_id(&rentals);
    let mut rental = Rental::new(label_parts.join(" "), start, now, id);
    rental.kind = kind;
    rental.end_date = end;
    rental.paid = end.is_some();

    store.add_rental(rental)?;
    println!("Created rental {id}.");
    Ok(())
}

#[instrument(skip(store, renderer))]
fn cmd_list(store: &mut DataStore, renderer: &mut Renderer) -> anyhow::Result<()> {
    info!("command list");
    let mut rentals = store.load_rentals()?;
    rentals.sort_by_key(|rental| rental.id);
    renderer.print_rental_table(&rentals)
}

fn selector_arg(args: &[String], command: &str) -> anyhow::Result<RentalRef> {
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("{command}: a rental id or uuid is required"))?;
    raw.parse()
}

#[instrument(skip(store, renderer, args))]
fn cmd_info(store: &mut DataStore, renderer: &mut Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command info");
    let selector = selector_arg(args, "info")?;
    let rental = store.find(&selector)?;
    renderer.print_rental_info(&rental)
}

fn open_session(
    store: &DataStore,
    cfg: &Config,
    selector: &RentalRef,
    today: NaiveDate,
) -> anyhow::Result<CoverageSession> {
    let horizon = cfg.coverage_horizon()?;
    let page_size = cfg.coverage_page_size()?;
    CoverageSession::open(store, selector, today, horizon, page_size)
        .with_context(|| format!("cannot edit coverage of rental {selector}"))
}

/// Pages are numbered from 1 on the command line.
fn parse_page_number(value: &str) -> anyhow::Result<usize> {
    let page: usize = value
        .parse()
        .with_context(|| format!("invalid page number: {value}"))?;
    page.checked_sub(1)
        .ok_or_else(|| anyhow!("pages are numbered from 1"))
}

#[instrument(skip(store, cfg, renderer, args, today))]
fn cmd_show(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command show");
    let selector = selector_arg(args, "show")?;
    let mut session = open_session(store, cfg, &selector, today)?;

    for arg in &args[1..] {
        match arg.split_once(':') {
            Some(("page", value)) => {
                session.go_to_page(parse_page_number(value)?);
            }
            _ => warn!(arg = %arg, "unrecognized show argument ignored"),
        }
    }

    renderer.print_coverage_page(&session)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Click {
    Page(usize),
    Next,
    Prev,
    Cell(usize),
    Month(NaiveDate),
}

fn parse_click(tok: &str) -> anyhow::Result<Click> {
    match tok {
        "next" => return Ok(Click::Next),
        "prev" => return Ok(Click::Prev),
        _ => {}
    }

    if let Some(value) = tok.strip_prefix("page:") {
        return Ok(Click::Page(parse_page_number(value)?));
    }

    if let Some(month) = parse_month_token(tok) {
        return Ok(Click::Month(month));
    }

    let cell: usize = tok
        .parse()
        .with_context(|| format!("expected a cell number, YYYY-MM, page:N, next or prev: {tok}"))?;
    cell.checked_sub(1)
        .map(Click::Cell)
        .ok_or_else(|| anyhow!("cells are numbered from 1"))
}

fn apply_click(session: &mut CoverageSession, click: &Click) -> anyhow::Result<()> {
    match click {
        Click::Page(page) => {
            session.go_to_page(*page);
        }
        Click::Next => {
            session.next_page();
        }
        Click::Prev => {
            session.prev_page();
        }
        Click::Cell(cell) => session.toggle_visible(*cell)?,
        Click::Month(month) => session.toggle_month(*month)?,
    }
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now, today))]
fn cmd_pay(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
    today: NaiveDate,
) -> anyhow::Result<()> {
    info!("command pay");
    let selector = selector_arg(args, "pay")?;

    let mut dry_run = false;
    let mut clicks = Vec::new();
    for arg in &args[1..] {
        if arg == "--dry-run" {
            dry_run = true;
        } else {
            clicks.push(parse_click(arg)?);
        }
    }

    let mut session = open_session(store, cfg, &selector, today)?;
    for click in &clicks {
        apply_click(&mut session, click).with_context(|| format!("click {click:?} rejected"))?;
    }

    if dry_run {
        renderer.print_coverage_page(&session)?;
        let end = session.preview()?;
        println!("Would cover rental {} through {}.", session.rental().id, end);
        return Ok(());
    }

    let end = session.commit(&*store, now)?;
    renderer.print_coverage_page(&session)?;
    println!("Rental {} covered through {}.", session.rental().id, end);
    Ok(())
}

#[instrument(skip(store))]
fn cmd_undo(store: &mut DataStore) -> anyhow::Result<()> {
    info!("command undo");
    if store.pop_undo_snapshot()? {
        println!("Undid last change.");
    } else {
        println!("Nothing to undo.");
    }
    Ok(())
}

fn cmd_show_config(cfg: &Config) -> anyhow::Result<()> {
    for file in &cfg.loaded_files {
        println!("# {}", file.display());
    }
    for (key, value) in cfg.iter() {
        println!("{key}={value}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "usage: quittance [options] <command> [args]

commands:
  add <label...> start:<date> [end:<date>] [kind:rental|sale]
  list
  info <id|uuid>
  show <id|uuid> [page:N]
  pay <id|uuid> [page:N|next|prev|<cell>|<YYYY-MM>]... [--dry-run]
  undo
  _show
  help
  version

dates: today, tomorrow, yesterday, YYYY-MM-DD, YYYY-MM, +Nd, +Nm, +Ny"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn expands_unique_prefixes() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("pa", &known), Some("pay"));
        assert_eq!(expand_command_abbrev("_show", &known), Some("_show"));
        assert_eq!(expand_command_abbrev("u", &known), Some("undo"));
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn parses_clicks() {
        assert_eq!(parse_click("3").expect("cell"), Click::Cell(2));
        assert_eq!(parse_click("page:2").expect("page"), Click::Page(1));
        assert_eq!(parse_click("next").expect("next"), Click::Next);
        assert_eq!(
            parse_click("2025-04").expect("month"),
            Click::Month(ymd(2025, 4, 1))
        );
        assert!(parse_click("0").is_err());
        assert!(parse_click("page:0").is_err());
        assert!(parse_click("soon").is_err());
    }

    #[test]
    fn parses_add_fields() {
        let today = ymd(2024, 1, 3);
        assert_eq!(
            parse_field("start:2024-01-15", today).expect("start"),
            Some(Field::Start(ymd(2024, 1, 15)))
        );
        assert_eq!(
            parse_field("kind=sale", today).expect("kind"),
            Some(Field::Kind(RentalKind::Sale))
        );
        assert_eq!(parse_field("Studio", today).expect("label"), None);
        assert!(parse_field("end:whenever", today).is_err());
    }

    #[test]
    fn pay_cells_follow_the_page_show_prints() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open datastore");
        let now = Utc
            .with_ymd_and_hms(2024, 1, 3, 9, 0, 0)
            .single()
            .expect("valid now");
        let today = ymd(2024, 1, 3);

        let mut rental = Rental::new("Studio".to_string(), ymd(2024, 1, 15), now, 1);
        rental.end_date = Some(ymd(2025, 3, 31));
        rental.paid = true;
        store.add_rental(rental).expect("add rental");

        let cfg = Config::default();
        let shown = open_session(&store, &cfg, &RentalRef::Id(1), today).expect("show session");
        assert_eq!(shown.visible()[2].date, ymd(2025, 3, 1));

        let mut paying =
            open_session(&store, &cfg, &RentalRef::Id(1), today).expect("pay session");
        let click = parse_click("3").expect("cell");
        apply_click(&mut paying, &click).expect("click");

        assert_eq!(paying.pager().current(), shown.pager().current());
        assert_eq!(paying.preview().expect("preview"), ymd(2025, 2, 28));
    }
}
