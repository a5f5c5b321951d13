//! Console log format for the OFG client.
//!
//! Lines look like `[timestamp] [component] [level] message`. A `component`
//! field on the event (see the `component_*!` macros) replaces the default
//! service name in the second column.

use std::fmt;

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::{format::Writer, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_CYAN: &str = "\x1b[36m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_BRIGHT_YELLOW: &str = "\x1b[93m";
const COLOR_BRIGHT_RED: &str = "\x1b[91m";
const COLOR_BRIGHT_GRAY: &str = "\x1b[90m";

const COMPONENT_WIDTH: usize = 20;
const LOG_LEVEL_WIDTH: usize = 9;

/// Log an info line tagged with a component name
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(component = $component, $($arg)*)
    };
}

/// Log a warning tagged with a component name
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(component = $component, $($arg)*)
    };
}

/// Log a debug line tagged with a component name
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(component = $component, $($arg)*)
    };
}

/// Formatter producing the client's console layout
pub struct OfgLogFormatter {
    service_name: String,
    color_enabled: bool,
}

impl OfgLogFormatter {
    /// Formatter for `service_name`, colored when writing to a terminal
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            color_enabled: is_terminal(),
        }
    }

    fn format_component(&self, component: Option<&str>) -> String {
        let name = match component {
            Some(comp) => format!("ofg-{}", comp),
            None => self.service_name.clone(),
        };

        if name.chars().count() > COMPONENT_WIDTH {
            let truncated: String = name.chars().take(COMPONENT_WIDTH - 1).collect();
            format!("{}…", truncated)
        } else {
            format!("{:<width$}", name, width = COMPONENT_WIDTH)
        }
    }

    fn format_level(level: &Level) -> String {
        let label = match *level {
            Level::ERROR => "✗ ERROR",
            Level::WARN => "⚠ WARN",
            Level::INFO => "ℹ INFO",
            Level::DEBUG => "◦ DEBUG",
            Level::TRACE => "◦ TRACE",
        };
        format!("{:<width$}", label, width = LOG_LEVEL_WIDTH)
    }

    fn color_for(&self, level: &Level) -> &'static str {
        if !self.color_enabled {
            return "";
        }
        match *level {
            Level::ERROR => COLOR_BRIGHT_RED,
            Level::WARN => COLOR_BRIGHT_YELLOW,
            Level::INFO => COLOR_GREEN,
            Level::DEBUG | Level::TRACE => COLOR_BRIGHT_GRAY,
        }
    }
}

impl<S, N> FormatEvent<S, N> for OfgLogFormatter
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
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let level = event.metadata().level();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let (cyan, reset) = if self.color_enabled {
            (COLOR_CYAN, COLOR_RESET)
        } else {
            ("", "")
        };

        write!(
            writer,
            "{}[{}] [{}] [{}{}{}] ",
            cyan,
            timestamp,
            self.format_component(visitor.component.as_deref()),
            self.color_for(level),
            Self::format_level(level),
            reset
        )?;
        writeln!(writer, "{}{}", visitor.message, reset)
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    component: Option<String>,
}

fn unquote(s: String) -> String {
    match s.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => s,
    }
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = unquote(format!("{:?}", value)),
            "component" => self.component = Some(unquote(format!("{:?}", value))),
            _ => {}
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "component" => self.component = Some(value.to_string()),
            _ => {}
        }
    }
}

fn is_terminal() -> bool {
    match std::env::var("TERM") {
        Ok(term) => term != "dumb",
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> OfgLogFormatter {
        OfgLogFormatter {
            service_name: "ofg-client".to_string(),
            color_enabled: false,
        }
    }

    #[test]
    fn test_component_column() {
        let f = plain();
        assert_eq!(f.format_component(None).trim_end(), "ofg-client");
        assert_eq!(f.format_component(Some("topology")).trim_end(), "ofg-topology");
        assert_eq!(f.format_component(None).chars().count(), COMPONENT_WIDTH);

        let long = f.format_component(Some("a-very-long-component-name"));
        assert_eq!(long.chars().count(), COMPONENT_WIDTH);
        assert!(long.ends_with('…'));
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"session\"".to_string()), "session");
        assert_eq!(unquote("plain".to_string()), "plain");
    }
}
