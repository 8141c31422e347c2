//! Output formatting for ssec (text, json)

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use ssec::{Event, StreamConfig};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Context for output rendering
pub struct OutputContext {
    pub format: OutputFormat,
    pub no_color: bool,
    pub quiet: bool,
}

impl OutputContext {
    pub fn new(format: OutputFormat, no_color: bool, quiet: bool) -> Self {
        if no_color {
            colored::control::set_override(false);
        }
        Self {
            format,
            no_color,
            quiet,
        }
    }

    /// Print a success message (unless in quiet mode)
    pub fn success(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg.green());
        }
    }

    /// Print an info message (unless in quiet mode)
    pub fn info(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", msg);
        }
    }

    /// Print a warning message
    pub fn warn(&self, msg: &str) {
        eprintln!("{}", msg.yellow());
    }

    /// Print one event on stdout
    pub fn print_event(&self, event: &Event) {
        println!("{}", self.format_event(event));
    }

    /// Render one event in the configured format
    pub fn format_event(&self, event: &Event) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Text if self.quiet => event.data_str().to_string(),
            OutputFormat::Text => {
                let label = format!("[{}]", event.event_type);
                let label = if self.no_color {
                    label
                } else {
                    label.cyan().bold().to_string()
                };
                // Continuation lines line up under the first data line
                let indent = " ".repeat(event.event_type.chars().count() + 3);
                let data = event.data_str().replace('\n', &format!("\n{}", indent));
                format!("{} {}", label, data)
            }
        }
    }

    /// Print a stream configuration in the configured format
    pub fn print_config(&self, config: &StreamConfig) -> Result<()> {
        let rendered = match self.format {
            OutputFormat::Text => config.to_yaml()?,
            OutputFormat::Json => config.to_json()?,
        };
        println!("{}", rendered.trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(format: OutputFormat, quiet: bool) -> OutputContext {
        OutputContext {
            format,
            no_color: true,
            quiet,
        }
    }

    #[test]
    fn test_text_event() {
        let ctx = ctx(OutputFormat::Text, false);
        assert_eq!(
            ctx.format_event(&Event::new("tick", "1")),
            "[tick] 1"
        );
        assert_eq!(
            ctx.format_event(&Event::message("a\nb")),
            "[message] a\n          b"
        );
    }

    #[test]
    fn test_quiet_text_event_is_data_only() {
        let ctx = ctx(OutputFormat::Text, true);
        assert_eq!(ctx.format_event(&Event::new("tick", "payload")), "payload");
    }

    #[test]
    fn test_json_event() {
        let ctx = ctx(OutputFormat::Json, false);
        let line = ctx.format_event(&Event::new("update", "{\"n\":1}"));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "update");
        assert_eq!(value["data"], "{\"n\":1}");
    }

    #[test]
    fn test_output_format_serde() {
        #[derive(Deserialize)]
        struct Doc {
            output: OutputFormat,
        }
        let doc: Doc = toml::from_str("output = \"json\"").unwrap();
        assert_eq!(doc.output, OutputFormat::Json);
    }
}
