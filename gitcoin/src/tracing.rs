//! Logging setup for the gitcoin daemons.
//!
//! Call [`init_journald_or_stdout`] once at startup. Everything else logs
//! through `use crate::tracing::prelude::*`, which brings in the usual
//! `trace!()` through `error!()` macros.
//!
//! On a terminal, each event is one line of `time level target: message`,
//! followed by an indented, dimmed line of structured fields if there are
//! any:
//!
//! ```text
//! 14:02:11 INFO  coordinator::gate: Commit pushed upstream
//!                commit=0000a3f1..., parent=00001c2e...
//! ```

use std::env;
use std::fmt;

use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        format::{DefaultFields, Writer},
        time::FormatTime,
        FmtContext, FormatEvent, FormatFields,
    },
    prelude::*,
    registry::LookupSpan,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

const CRATE_PREFIX: &str = "gitcoin::";

// Width of "hh:mm:ss LEVEL " so field lines align under the target
const FIELD_INDENT: usize = 15;

/// Initialize logging.
///
/// Under systemd (`JOURNAL_STREAM` set) events go to journald; otherwise
/// to stdout, filtered by `RUST_LOG` with INFO as the default level.
pub fn init_journald_or_stdout() {
    if env::var_os("JOURNAL_STREAM").is_none() {
        init_stdout();
        return;
    }

    match tracing_journald::layer() {
        Ok(layer) => tracing_subscriber::registry().with(layer).init(),
        Err(e) => {
            init_stdout();
            error!(error = %e, "Failed to initialize journald logging, using stdout.");
        }
    }
}

fn init_stdout() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .fmt_fields(DefaultFields::new())
                .event_format(TerminalFormat),
        )
        .init();
}

/// Target shown for an event: our own modules lose the crate prefix, and
/// events bridged from `log` use the target they carried.
fn display_target<'a>(target: &'a str, fields: &'a [(String, String)]) -> &'a str {
    if let Some(ours) = target.strip_prefix(CRATE_PREFIX) {
        return ours;
    }
    if target == "log" {
        if let Some((_, bridged)) = fields.iter().find(|(name, _)| name == "log.target") {
            return bridged.trim_matches('"');
        }
    }
    target
}

fn level_style(level: Level) -> (&'static str, &'static str) {
    match level {
        Level::ERROR => ("\x1b[31m", "ERROR"),
        Level::WARN => ("\x1b[33m", "WARN "),
        Level::INFO => ("\x1b[32m", "INFO "),
        Level::DEBUG => ("\x1b[34m", "DEBUG"),
        Level::TRACE => ("\x1b[35m", "TRACE"),
    }
}

/// Render a recorded value without Debug noise: `Some("x")` becomes `x`.
fn clean_value(raw: &str) -> &str {
    let unwrapped = raw
        .strip_prefix("Some(")
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(raw);
    unwrapped.trim_matches('"')
}

#[derive(Default)]
struct Fields {
    message: Option<String>,
    pairs: Vec<(String, String)>,
}

impl Visit for Fields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.pairs.push((field.name().to_string(), rendered));
        }
    }
}

struct TerminalFormat;

impl<S, N> FormatEvent<S, N> for TerminalFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = Fields::default();
        event.record(&mut fields);

        LocalTimer.format_time(&mut writer)?;
        let (color, label) = level_style(*event.metadata().level());
        write!(writer, " {}{}\x1b[0m ", color, label)?;
        write!(
            writer,
            "{}: ",
            display_target(event.metadata().target(), &fields.pairs)
        )?;
        if let Some(message) = &fields.message {
            write!(writer, "{}", message.trim_matches('"'))?;
        }

        let mut shown = fields
            .pairs
            .iter()
            .filter(|(name, _)| !name.starts_with("log."))
            .peekable();
        if shown.peek().is_some() {
            write!(writer, "\n\x1b[90m{:width$}", "", width = FIELD_INDENT)?;
            for (i, (name, value)) in shown.enumerate() {
                let separator = if i == 0 { "" } else { ", " };
                write!(writer, "{}{}={}", separator, name, clean_value(value))?;
            }
            write!(writer, "\x1b[0m")?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        w.write_str(&stamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_target() {
        assert_eq!(display_target("gitcoin::miner::session", &[]), "miner::session");
        assert_eq!(display_target("tokio::net", &[]), "tokio::net");

        let bridged = vec![("log.target".to_string(), "\"hyper::proto\"".to_string())];
        assert_eq!(display_target("log", &bridged), "hyper::proto");
        assert_eq!(display_target("log", &[]), "log");
    }

    #[test]
    fn test_clean_value() {
        assert_eq!(clean_value("Some(\"0007\")"), "0007");
        assert_eq!(clean_value("\"abc\""), "abc");
        assert_eq!(clean_value("42"), "42");
        assert_eq!(clean_value("None"), "None");
    }
}
