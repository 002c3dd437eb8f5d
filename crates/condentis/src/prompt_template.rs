use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context, Error as TeraError, Tera};

use crate::models::tool::ToolDeclaration;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");

/// Values the system prompt template is rendered with.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub cwd: String,
    pub tools: Vec<ToolDeclaration>,
    pub developer_instructions: Option<String>,
    pub user_instructions: Option<String>,
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

pub fn load_prompt_file<T: Serialize>(
    template_file: impl Into<PathBuf>,
    context_data: &T,
) -> Result<String, TeraError> {
    let template_path = template_file.into();
    let template_content = fs::read_to_string(&template_path)
        .map_err(|e| TeraError::chain("Failed to read template file", e))?;
    load_prompt(&template_content, context_data)
}

/// Render the built-in system prompt.
pub fn system_prompt(context: &PromptContext) -> Result<String, TeraError> {
    load_prompt(SYSTEM_TEMPLATE, context).map(|prompt| prompt.trim().to_string())
}
