use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Target used for periodic and total report lines
pub const REPORT_TARGET: &str = "sbk::report";

/// Console formatter for the `sbk` binary.
///
/// Report lines (events logged to [`REPORT_TARGET`]) are printed bold with
/// the product prefix so they stand out from diagnostics. Every other event
/// is printed without metadata and colored according to its level.
pub struct SbkFormatter;

impl<S, N> FormatEvent<S, N> for SbkFormatter
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
        // Fields are buffered so the whole line can be styled at once
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let metadata = event.metadata();
        if metadata.target() == REPORT_TARGET {
            let prefix = crate::defaults::NAME.to_uppercase();
            return writeln!(writer, "{} {}", prefix.cyan().bold(), buffer.bold());
        }

        let colored_output = match *metadata.level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };
        writeln!(writer, "{}", colored_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::{LatencyRecords, LatencyWindowConfig};
    use crate::report::{LatencyReport, LogPrinter, Print};
    use crate::time::TimeUnit;
    use parking_lot::Mutex;
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_report_lines_are_prefixed() {
        colored::control::set_override(false);
        let capture = Capture::default();
        let sink = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .event_format(SbkFormatter)
            .with_writer(move || sink.clone())
            .finish();

        let config = LatencyWindowConfig {
            percentile_fractions: vec![0.5],
            ..LatencyWindowConfig::new(0, 100, TimeUnit::Ms)
        };
        let report = LatencyReport::new(&LatencyRecords::new(0), &config, 10, vec![0]);

        tracing::subscriber::with_default(subscriber, || {
            LogPrinter::new("Writing").print(&report);
            tracing::warn!("spill failed");
        });

        let output = String::from_utf8(capture.0.lock().clone()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("SBK Writing 0 records"), "{}", lines[0]);
        assert_eq!(lines[1], "spill failed");
    }
}
