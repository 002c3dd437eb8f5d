use std::io::{self, Write};

use condentis::events::{AgentEvent, AgentEventType};
use console::style;
use serde_json::Value;

const MAX_STRING_LENGTH: usize = 40;
const MAX_OUTPUT_LINES: usize = 12;
const INDENT: &str = "    ";

/// Writes agent events to a terminal as they arrive
pub struct Renderer<W: Write> {
    out: W,
    /// Text deltas were written since the last line break
    streaming: bool,
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            streaming: false,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    pub fn render(&mut self, event: &AgentEvent) -> io::Result<()> {
        match event.kind {
            AgentEventType::AgentStart => Ok(()),
            AgentEventType::TextDelta => {
                write!(self.out, "{}", event.text("content").unwrap_or_default())?;
                self.streaming = true;
                self.out.flush()
            }
            AgentEventType::TextComplete => self.end_line(),
            AgentEventType::ToolCallStart => {
                self.end_line()?;
                writeln!(
                    self.out,
                    "─── {} | {} ──────────────────────────",
                    style(event.text("name").unwrap_or("unknown")),
                    style(event.text("call_id").unwrap_or("unknown")).magenta().dim(),
                )?;
                if let Some(arguments) = event.data.get("arguments") {
                    self.print_params(arguments, 0)?;
                }
                Ok(())
            }
            AgentEventType::ToolCallComplete => self.print_tool_result(event),
            AgentEventType::AgentError => {
                self.end_line()?;
                writeln!(
                    self.out,
                    "{} {}",
                    style("error:").red().bold(),
                    event.text("error").unwrap_or("unknown error")
                )
            }
            AgentEventType::AgentEnd => {
                self.end_line()?;
                if let Some(usage) = event.data.get("usage").filter(|usage| !usage.is_null()) {
                    writeln!(
                        self.out,
                        "{}",
                        style(format!(
                            "tokens: {} in, {} out",
                            usage["prompt_tokens"], usage["completion_tokens"]
                        ))
                        .dim()
                    )?;
                }
                Ok(())
            }
        }
    }

    fn end_line(&mut self) -> io::Result<()> {
        if self.streaming {
            self.streaming = false;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn print_tool_result(&mut self, event: &AgentEvent) -> io::Result<()> {
        let name = event.text("name").unwrap_or("unknown");
        if event.data.get("success") != Some(&Value::Bool(true)) {
            return writeln!(
                self.out,
                "{} {}: {}",
                style("✗").red(),
                name,
                event.text("error").unwrap_or_default()
            );
        }

        writeln!(self.out, "{} {}", style("✓").green(), name)?;
        let output = event.text("output").unwrap_or_default();
        let total = output.lines().count();
        for line in output.lines().take(MAX_OUTPUT_LINES) {
            writeln!(self.out, "{}{}", INDENT, style(line).dim())?;
        }
        if total > MAX_OUTPUT_LINES {
            writeln!(
                self.out,
                "{}{}",
                INDENT,
                style(format!("... {} more lines", total - MAX_OUTPUT_LINES)).dim()
            )?;
        }
        Ok(())
    }

    /// Print parameters recursively with indentation and colors
    fn print_params(&mut self, value: &Value, depth: usize) -> io::Result<()> {
        let indent = INDENT.repeat(depth);
        match value {
            Value::Object(map) => {
                for (key, val) in map {
                    match val {
                        Value::Object(_) | Value::Array(_) => {
                            writeln!(self.out, "{}{}:", indent, style(key).dim())?;
                            self.print_params(val, depth + 1)?;
                        }
                        Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                            writeln!(self.out, "{}{}: {}", indent, style(key).dim(), style("...").dim())?;
                        }
                        Value::String(s) => {
                            writeln!(self.out, "{}{}: {}", indent, style(key).dim(), style(s).green())?;
                        }
                        other => {
                            writeln!(self.out, "{}{}: {}", indent, style(key).dim(), style(other).blue())?;
                        }
                    }
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    writeln!(self.out, "{}{}.", indent, i + 1)?;
                    self.print_params(item, depth + 1)?;
                }
            }
            Value::String(s) if s.len() > MAX_STRING_LENGTH => {
                writeln!(
                    self.out,
                    "{}{}",
                    indent,
                    style(format!("[{} chars]", s.len())).yellow()
                )?;
            }
            Value::String(s) => writeln!(self.out, "{}{}", indent, style(s).green())?,
            Value::Null => writeln!(self.out, "{}{}", indent, style("null").dim())?,
            other => writeln!(self.out, "{}{}", indent, style(other).yellow())?,
        }
        Ok(())
    }
}
