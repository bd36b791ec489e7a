use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  Months,
  NaiveDate,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "quittance-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "QUITTANCE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "QUITTANCE_TIME_CONFIG";
const DEFAULT_PROJECT_TIMEZONE: &str =
  "Europe/Paris";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

impl TimezoneConfig {
  fn into_timezone(
    self
  ) -> Option<String> {
    self.timezone.or_else(|| {
      self.time.and_then(|section| {
        section.timezone
      })
    })
  }
}

/// Timezone used to decide which
/// calendar day "today" is for the
/// agency. Resolved once per process.
pub fn project_timezone() -> &'static Tz
{
  static PROJECT_TZ: OnceLock<Tz> =
    OnceLock::new();
  PROJECT_TZ.get_or_init(
    resolve_project_timezone
  )
}

#[must_use]
pub fn to_project_date(
  dt: DateTime<Utc>
) -> NaiveDate {
  dt.with_timezone(project_timezone())
    .date_naive()
}

fn resolve_project_timezone() -> Tz {
  let from_env =
    std::env::var(TIMEZONE_ENV_VAR)
      .ok()
      .and_then(|raw| {
        parse_timezone(
          &raw,
          TIMEZONE_ENV_VAR
        )
      });
  if let Some(tz) = from_env {
    return tz;
  }

  if let Some(tz) =
    timezone_config_path()
      .as_deref()
      .and_then(load_timezone_from_file)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_PROJECT_TIMEZONE,
    "default"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "fallback timezone did not \
       parse; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  match std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    | Ok(raw)
      if !raw.trim().is_empty() =>
    {
      Some(PathBuf::from(raw.trim()))
    }
    | _ => {
      std::env::current_dir()
        .ok()
        .map(|dir| {
          dir.join(TIMEZONE_CONFIG_FILE)
        })
    }
  }
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "no timezone config file"
    );
    return None;
  }

  let parsed = fs::read_to_string(path)
    .map_err(|err| err.to_string())
    .and_then(|raw| {
      toml::from_str::<TimezoneConfig>(
        &raw
      )
      .map_err(|err| err.to_string())
    });

  let timezone = match parsed {
    | Ok(cfg) => cfg.into_timezone(),
    | Err(error) => {
      tracing::error!(
        file = %path.display(),
        %error,
        "unreadable timezone config file"
      );
      return None;
    }
  };

  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    &timezone,
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  trimmed
    .parse::<Tz>()
    .inspect(|_| {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured project timezone"
      );
    })
    .map_err(|error| {
      tracing::error!(
        source,
        timezone = %trimmed,
        %error,
        "failed to parse timezone id"
      );
    })
    .ok()
}

/// First day of the month containing
/// `date`.
#[must_use]
pub fn start_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

/// Last day of the month containing
/// `date`.
#[must_use]
pub fn end_of_month(
  date: NaiveDate
) -> NaiveDate {
  start_of_month(date)
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .unwrap_or(NaiveDate::MAX)
}

/// `date` moved forward by `months`
/// calendar months, or `None` past the
/// end of the representable range.
#[must_use]
pub fn add_months(
  date: NaiveDate,
  months: u32
) -> Option<NaiveDate> {
  date.checked_add_months(Months::new(
    months
  ))
}

#[must_use]
pub fn same_month(
  a: NaiveDate,
  b: NaiveDate
) -> bool {
  a.year() == b.year()
    && a.month() == b.month()
}

/// Parses a `YYYY-MM` token into the
/// first day of that month.
#[must_use]
pub fn parse_month_token(
  token: &str
) -> Option<NaiveDate> {
  let (year, month) =
    token.trim().split_once('-')?;
  if year.len() != 4
    || month.len() != 2
  {
    return None;
  }
  let year: i32 = year.parse().ok()?;
  let month: u32 = month.parse().ok()?;
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
}

/// Parses the date expressions
/// accepted on the command line,
/// relative to `today`.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();

  match token
    .to_ascii_lowercase()
    .as_str()
  {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return Ok(
        today + Duration::days(1)
      );
    }
    | "yesterday" => {
      return Ok(
        today - Duration::days(1)
      );
    }
    | _ => {}
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Ok(date);
  }

  if let Some(month) =
    parse_month_token(token)
  {
    return Ok(month);
  }

  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dmy])$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  let caps =
    rel_re.captures(token).ok_or_else(
      || {
        anyhow!(
          "unrecognized date \
           expression: {token}"
        )
      }
    )?;

  let backwards = &caps["sign"] == "-";
  let num: u32 = caps["num"]
    .parse()
    .context("invalid relative amount")?;

  let shifted = match &caps["unit"] {
    | "d" => {
      let delta =
        Duration::days(i64::from(num));
      if backwards {
        today.checked_sub_signed(delta)
      } else {
        today.checked_add_signed(delta)
      }
    }
    | unit => {
      let months = if unit == "y" {
        num.checked_mul(12)
      } else {
        Some(num)
      }
      .ok_or_else(|| {
        anyhow!(
          "relative amount too large: \
           {token}"
        )
      })?;
      if backwards {
        today.checked_sub_months(
          Months::new(months)
        )
      } else {
        today.checked_add_months(
          Months::new(months)
        )
      }
    }
  };

  shifted.ok_or_else(|| {
    anyhow!(
      "date expression out of range: \
       {token}"
    )
  })
}


/// Serde adapter storing dates as
/// `YYYY-MM-DD` strings.
pub mod iso_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  const FORMAT: &str = "%Y-%m-%d";

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &date.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    NaiveDate::parse_from_str(
      &raw, FORMAT
    )
    .map_err(serde::de::Error::custom)
  }

  pub mod option {
    use chrono::NaiveDate;
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      date: &Option<NaiveDate>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match date {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<NaiveDate>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      Option::<String>::deserialize(
        deserializer
      )?
      .map(|raw| {
        NaiveDate::parse_from_str(
          &raw,
          super::FORMAT
        )
        .map_err(
          serde::de::Error::custom
        )
      })
      .transpose()
    }
  }
}
