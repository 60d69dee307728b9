//! JSON output format

use termcolor::WriteColor;

use crate::error::Result;

use super::{OutputFormatter, PlanReport};

/// JSON output formatter
pub struct JsonOutput {
    pretty: bool,
}

impl JsonOutput {
    pub fn new() -> Self {
        Self { pretty: true }
    }

    pub fn compact() -> Self {
        Self { pretty: false }
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn render(&self, report: &PlanReport, writer: &mut dyn WriteColor) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut *writer, report)?;
        } else {
            serde_json::to_writer(&mut *writer, report)?;
        }
        writeln!(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ring::{RingEntry, TokenRange, TokenRangeSplitter};
    use termcolor::NoColor;

    #[test]
    fn test_json_plan() {
        let topology = vec![RingEntry::new(TokenRange::full_ring(), vec!["a".into()])];
        let partitions = TokenRangeSplitter::new(2).split(&topology).unwrap();
        let config = Config::new("ks", "t");
        let report = PlanReport::new(2, &partitions).with_queries(&config, &["id".to_string()]);

        let mut out = NoColor::new(Vec::new());
        JsonOutput::compact().render(&report, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out.into_inner()).unwrap();

        assert_eq!(value["target"], 2);
        let parts = value["partitions"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["range"]["start"], i64::MIN);
        assert_eq!(parts[1]["range"]["end"], i64::MIN);
        assert_eq!(parts[0]["replicas"][0], "a");
        assert_eq!(parts[0]["queries"].as_array().unwrap().len(), 1);
    }
}
