//! Colored terminal output

use tabled::builder::Builder;
use tabled::settings::Style;
use termcolor::{Color, ColorSpec, WriteColor};

use crate::error::Result;

use super::{OutputFormatter, PlanReport};

/// Terminal output with colors
pub struct TerminalOutput {
    show_replicas: bool,
}

impl TerminalOutput {
    pub fn new() -> Self {
        Self {
            show_replicas: true,
        }
    }

    /// Omit the replica column
    pub fn without_replicas() -> Self {
        Self {
            show_replicas: false,
        }
    }

    fn write_header(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()> {
        writer.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)).set_bold(true))?;
        write!(writer, "ringbridge")?;
        writer.reset()?;
        writeln!(
            writer,
            ": {} partition(s), target {}",
            report.partitions.len(),
            report.target
        )?;
        writeln!(writer)?;
        Ok(())
    }

    fn write_partitions(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()> {
        let mut builder = Builder::default();
        let mut header = vec!["#".to_string(), "range".to_string(), "share".to_string()];
        if self.show_replicas {
            header.push("replicas".to_string());
        }
        builder.push_record(header);

        for entry in &report.partitions {
            let mut record = vec![
                entry.index.to_string(),
                entry.range.to_string(),
                format!("{:.2}%", entry.ring_share),
            ];
            if self.show_replicas {
                record.push(entry.replicas.join(", "));
            }
            builder.push_record(record);
        }

        let mut table = builder.build();
        table.with(Style::rounded());
        writeln!(writer, "{}", table)?;
        Ok(())
    }

    fn write_queries(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()> {
        if !report.has_queries() {
            return Ok(());
        }

        writeln!(writer)?;
        writeln!(writer, "Queries:")?;
        for entry in &report.partitions {
            for query in &entry.queries {
                writer.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
                write!(writer, "  [{}] ", entry.index)?;
                writer.reset()?;
                writeln!(writer, "{}", query)?;
            }
        }
        Ok(())
    }
}

impl Default for TerminalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TerminalOutput {
    fn render(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()> {
        self.write_header(report, writer)?;

        if report.partitions.is_empty() {
            writeln!(writer, "No partitions.")?;
            return Ok(());
        }

        self.write_partitions(report, writer)?;
        self.write_queries(report, writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{RingEntry, TokenRange, TokenRangeSplitter};
    use termcolor::NoColor;

    fn report() -> PlanReport {
        let topology = vec![RingEntry::new(TokenRange::full_ring(), vec!["10.0.0.1".into()])];
        let partitions = TokenRangeSplitter::new(2).split(&topology).unwrap();
        PlanReport::new(2, &partitions)
    }

    #[test]
    fn test_terminal_lists_partitions() {
        let mut out = NoColor::new(Vec::new());
        TerminalOutput::new().render(&report(), &mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.contains("2 partition(s), target 2"));
        assert!(text.contains("(-9223372036854775808, 0]"));
        assert!(text.contains("50.00%"));
        assert!(text.contains("10.0.0.1"));
        assert!(!text.contains("Queries:"));
    }

    #[test]
    fn test_terminal_without_replicas() {
        let mut out = NoColor::new(Vec::new());
        TerminalOutput::without_replicas().render(&report(), &mut out).unwrap();
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(!text.contains("10.0.0.1"));
    }
}
