use std::fmt;

use anstream::ColorChoice;
use anyhow::Context;
use owo_colors::OwoColorize;
use tracing::{Event, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

use untangle_settings::EnvVars;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    /// Only errors.
    Quiet,
    /// Info messages and up, without targets.
    #[default]
    Default,
    /// Debug messages, with their targets.
    Verbose,
    /// Everything, including the state table of every resolution round.
    ExtraVerbose,
}

impl Level {
    pub(crate) fn from_args(quiet: bool, verbose: u8) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Default,
            (false, 1) => Self::Verbose,
            (false, _) => Self::ExtraVerbose,
        }
    }

    /// The filter for all `untangle` crates, unless `RUST_LOG` is set.
    fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "untangle=error",
            Self::Default => "untangle=info",
            Self::Verbose => "untangle=debug",
            Self::ExtraVerbose => "untangle=trace",
        }
    }
}

struct UntangleFormat {
    display_target: bool,
}

impl<S, N> FormatEvent<S, N> for UntangleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta = event.metadata();
        let ansi = writer.has_ansi_escapes();

        let level = meta.level();
        if ansi {
            match *level {
                tracing::Level::TRACE => write!(writer, "{} ", level.purple())?,
                tracing::Level::DEBUG => write!(writer, "{} ", level.blue())?,
                tracing::Level::INFO => write!(writer, "{} ", level.green())?,
                tracing::Level::WARN => write!(writer, "{} ", level.yellow())?,
                tracing::Level::ERROR => write!(writer, "{} ", level.red())?,
            }
        } else {
            write!(writer, "{level} ")?;
        }

        if self.display_target {
            if ansi {
                write!(writer, "{} ", meta.target().dimmed())?;
            } else {
                write!(writer, "{} ", meta.target())?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Log to stderr, filtered by `RUST_LOG` or else by the given [`Level`]. Standard output is
/// left to the command's result.
pub(crate) fn setup_logging(level: Level) -> anyhow::Result<()> {
    let directive = level
        .directive()
        .parse::<Directive>()
        .context("Invalid default log directive")?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env()
        .context("Invalid RUST_LOG directives")?;
    let filter = if std::env::var_os(EnvVars::RUST_LOG).is_some() {
        filter
    } else {
        filter.add_directive(directive)
    };

    let ansi = match anstream::Stderr::choice(&std::io::stderr()) {
        ColorChoice::Always | ColorChoice::AlwaysAnsi => true,
        ColorChoice::Never | ColorChoice::Auto => false,
    };
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .event_format(UntangleFormat {
            display_target: matches!(level, Level::Verbose | Level::ExtraVerbose),
        })
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
        .context("Failed to install the log subscriber")
}

#[cfg(test)]
mod tests {
    use super::{Level, setup_logging};

    #[test]
    fn level_from_args() {
        assert_eq!(Level::from_args(true, 0), Level::Quiet);
        assert_eq!(Level::from_args(false, 0), Level::Default);
        assert_eq!(Level::from_args(false, 1), Level::Verbose);
        assert_eq!(Level::from_args(false, 3), Level::ExtraVerbose);
    }

    #[test]
    fn install_subscriber() {
        setup_logging(Level::Verbose).unwrap();
        tracing::debug!("subscriber installed");
    }
}
