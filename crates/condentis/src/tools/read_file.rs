use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::base::{Tool, ToolInvocation, ToolKind, ToolResult};
use super::schema::{ParamsSchema, TypedSchema};
use crate::errors::{AgentError, AgentResult};
use crate::token_counter::TokenCounter;

const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
const MAX_OUTPUT_TOKENS: usize = 25_000;
const BINARY_SNIFF_BYTES: usize = 8192;

#[derive(Debug, Deserialize)]
pub struct ReadFileParams {
    pub path: String,
    #[serde(default = "first_line")]
    pub offset: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn first_line() -> usize {
    1
}

/// Reads a text file, numbering its lines.
pub struct ReadFileTool {
    schema: TypedSchema<ReadFileParams>,
    token_counter: Arc<TokenCounter>,
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new(Arc::new(TokenCounter::new()))
    }
}

impl ReadFileTool {
    pub fn new(token_counter: Arc<TokenCounter>) -> Self {
        let schema = TypedSchema::new(
            json!({
                "path": {
                    "type": "string",
                    "description": "Path to the file to read"
                },
                "offset": {
                    "type": "integer",
                    "minimum": 1,
                    "default": 1,
                    "description": "Line number to start reading from (1-indexed)"
                },
                "limit": {
                    "type": "integer",
                    "minimum": 1,
                    "default": null,
                    "description": "Number of lines to read"
                }
            }),
            &["path"],
        );
        Self {
            schema,
            token_counter,
        }
    }
}

fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_BYTES).any(|byte| *byte == 0)
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{} bytes", bytes)
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Returns the file contents with line numbers. \
        For large files, use offset and limit to read only a portion of the file. \
        Cannot read binary files."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Read
    }

    fn schema(&self) -> &dyn ParamsSchema {
        &self.schema
    }

    async fn execute(&self, invocation: ToolInvocation) -> AgentResult<ToolResult> {
        let params = self.schema.parse(&invocation.params)?;
        let path = resolve_path(&invocation.cwd, &params.path);

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::error("File not found"));
            }
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            return Ok(ToolResult::error("Path is not a file"));
        }
        if metadata.len() > MAX_FILE_SIZE {
            return Ok(ToolResult::error(format!(
                "File is too large ({:.1} MB). Maximum file size is {} MB",
                metadata.len() as f64 / (1024.0 * 1024.0),
                MAX_FILE_SIZE / (1024 * 1024)
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AgentError::ExecutionError(format!("Error reading file: {}", e)))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        if is_binary(&bytes) {
            return Ok(ToolResult::error(format!(
                "Cannot read binary file: {} ({}). Only text files can be read.",
                file_name,
                format_size(metadata.len())
            )));
        }

        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        if total_lines == 0 {
            return Ok(ToolResult::success("File is empty.").with_metadata("total_lines", 0));
        }

        let start = params.offset.max(1) - 1;
        if start >= total_lines {
            return Ok(ToolResult::error(format!(
                "Offset {} is beyond the end of the file ({} lines)",
                params.offset, total_lines
            ))
            .with_metadata("total_lines", total_lines));
        }
        let end = match params.limit {
            Some(limit) => start.saturating_add(limit).min(total_lines),
            None => total_lines,
        };
        let selected = &lines[start..end];

        let mut output = selected
            .iter()
            .enumerate()
            .map(|(i, line)| format!("{:>6} | {}", start + i + 1, line))
            .collect::<Vec<_>>()
            .join("\n");

        let mut truncated = false;
        if self.token_counter.count_tokens(&output, None) > MAX_OUTPUT_TOKENS {
            output = self.token_counter.truncate(
                &output,
                MAX_OUTPUT_TOKENS,
                None,
                &format!("\n...[Truncated {} lines]", total_lines),
                true,
            );
            truncated = true;
        }

        if start > 0 || end < total_lines {
            output = format!(
                "Read lines {}-{} of {} from {}\n\n{}",
                start + 1,
                end,
                total_lines,
                file_name,
                output
            );
        }

        Ok(ToolResult::success(output)
            .with_truncated(truncated)
            .with_metadata("path", path.display().to_string())
            .with_metadata("total_lines", total_lines)
            .with_metadata("shown_start", start + 1)
            .with_metadata("shown_end", end)
            .with_metadata("lines_read", selected.len()))
    }
}
