//! Output formatters for run results
//!
//! Provides Table, JSON, CSV and one-line summary renderings of a
//! [`RunSummary`] once the suite has settled.

use std::io::Write;
use std::str::FromStr;

use crate::models::{RunSummary, TestSnapshot, TestStatus};
use crate::utils::format_elapsed;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Ok(OutputFormat::JsonPretty),
            "csv" => Ok(OutputFormat::Csv),
            "summary" => Ok(OutputFormat::Summary),
            other => Err(format!("Unknown output format: {other}")),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single test result
    pub fn format_result(&self, result: &TestSnapshot) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => self.format_result_csv(result),
            OutputFormat::Summary => result.to_string(),
        }
    }

    fn status_label(&self, status: TestStatus) -> String {
        let label = format!("{:7}", status.to_string());
        if !self.colorize {
            return label;
        }
        let color = match status {
            TestStatus::FinishedSuccessfully => "32",
            TestStatus::FinishedError => "31",
            TestStatus::Running => "33",
            TestStatus::Idle | TestStatus::WaitingForDependencies => "90",
        };
        format!("\x1b[{color}m{label}\x1b[0m")
    }

    fn format_result_table(&self, result: &TestSnapshot) -> String {
        let elapsed = result
            .completion_time
            .map(format_elapsed)
            .unwrap_or_else(|| "    -".to_string());

        let mut line = format!(
            "{} {:48} {}",
            self.status_label(result.status),
            result.full_id,
            elapsed
        );
        if let Some(message) = &result.failure_message {
            let kind = result.failure_type.as_deref().unwrap_or("Error");
            line.push_str(&format!("\n        {kind}: {message}"));
            for frame in &result.failure_stacktrace {
                line.push_str(&format!("\n          {frame}"));
            }
        }
        line
    }

    fn format_result_csv(&self, result: &TestSnapshot) -> String {
        format!(
            "{},{},{},{},{}",
            csv_field(&result.full_id),
            result.status,
            result
                .completion_time
                .map(|d| d.as_millis().to_string())
                .unwrap_or_default(),
            csv_field(result.failure_type.as_deref().unwrap_or("")),
            csv_field(result.failure_message.as_deref().unwrap_or(""))
        )
    }

    /// Format a run summary
    pub fn format_summary(&self, summary: &RunSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => self.format_summary_csv(summary),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &RunSummary) -> String {
        let mut output = String::new();

        output.push_str("\n═══════════════════════════════════════════════════════════════\n");
        output.push_str(&format!(
            " Test run {}\n",
            summary.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        output.push_str("═══════════════════════════════════════════════════════════════\n");

        for result in &summary.results {
            output.push_str(&self.format_result_table(result));
            output.push('\n');
        }

        output.push_str("───────────────────────────────────────────────────────────────\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            " Total: {} | Pass: {} | Error: {} | Waiting: {} | Unfinished: {}\n",
            summary.total, pass_str, fail_str, summary.waiting, summary.unfinished
        ));
        output.push_str(&format!(
            " Pass Rate: {:5.1}% | Wall time: {}ms\n",
            summary.pass_rate(),
            summary.wall_time_ms()
        ));

        output
    }

    fn format_summary_csv(&self, summary: &RunSummary) -> String {
        let mut output = String::new();
        output.push_str("full_id,status,duration_ms,failure_type,failure_message\n");
        for result in &summary.results {
            output.push_str(&self.format_result_csv(result));
            output.push('\n');
        }
        output
    }

    fn format_summary_brief(&self, summary: &RunSummary) -> String {
        format!(
            "{}/{} passed ({:.1}%), {} failed, {} waiting in {}ms",
            summary.passed,
            summary.total,
            summary.pass_rate(),
            summary.failed,
            summary.waiting,
            summary.wall_time_ms()
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

/// Write a run summary to a file
pub fn write_results_to_file(
    path: &str,
    summary: &RunSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

/// Quote a CSV field, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn snapshot(id: &str, status: TestStatus) -> TestSnapshot {
        TestSnapshot {
            namespace: "ns".to_string(),
            id: id.to_string(),
            full_id: format!("ns.{id}"),
            description: None,
            dependencies: Vec::new(),
            timeout: Duration::from_secs(30),
            is_async: false,
            status,
            completion_time: Some(Duration::from_millis(12)),
            failure_type: None,
            failure_message: None,
            failure_stacktrace: Vec::new(),
        }
    }

    fn summary() -> RunSummary {
        let mut failed = snapshot("bad", TestStatus::FinishedError);
        failed.failure_type = Some("Equal".to_string());
        failed.failure_message = Some("The value 1 does not equal 2".to_string());
        failed.failure_stacktrace = vec!["at src/suites.rs:10:5".to_string()];
        RunSummary::new(
            Utc::now(),
            vec![snapshot("good", TestStatus::FinishedSuccessfully), failed],
        )
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse(), Ok(OutputFormat::Json));
        assert_eq!("TABLE".parse(), Ok(OutputFormat::Table));
        assert!("unknown".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = ResultFormatter::new(OutputFormat::Json).no_color();
        assert_eq!(formatter.format, OutputFormat::Json);
        assert!(!formatter.colorize);
    }

    #[test]
    fn test_table_includes_failure_details() {
        let output = ResultFormatter::new(OutputFormat::Table)
            .no_color()
            .format_summary(&summary());
        assert!(output.contains("ns.good"));
        assert!(output.contains("Equal: The value 1 does not equal 2"));
        assert!(output.contains("at src/suites.rs:10:5"));
        assert!(output.contains("Pass: 1 | Error: 1"));
    }

    #[test]
    fn test_json_round_trips_summary() {
        let output = ResultFormatter::new(OutputFormat::Json).format_summary(&summary());
        let parsed: RunSummary = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.total, 2);
        assert_eq!(parsed.results[1].failure_type.as_deref(), Some("Equal"));
    }

    #[test]
    fn test_csv_escapes_quotes() {
        let mut result = snapshot("quoted", TestStatus::FinishedError);
        result.failure_message = Some("said \"no\"".to_string());
        let line = ResultFormatter::new(OutputFormat::Csv).format_result(&result);
        assert!(line.ends_with("\"said \"\"no\"\"\""));
    }

    #[test]
    fn test_csv_quotes_full_id() {
        let result = snapshot("a,b", TestStatus::FinishedSuccessfully);
        let line = ResultFormatter::new(OutputFormat::Csv).format_result(&result);
        assert_eq!(line, format!("\"ns.a,b\",{},12,\"\",\"\"", result.status));
    }

    #[test]
    fn test_brief_summary() {
        let output = ResultFormatter::new(OutputFormat::Summary).format_summary(&summary());
        assert!(output.starts_with("1/2 passed (50.0%), 1 failed, 0 waiting"));
    }
}
