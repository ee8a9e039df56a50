//! Built-in placeholder template compiler.
//!
//! Substitutes `{{ key }}` and `{{ key.nested }}` with values from the data
//! mapping. Strings are inserted verbatim, `null` as nothing, other values
//! as JSON.

use super::{RenderFn, TemplateCompiler, TemplateError};
use crate::render::{RenderData, RenderError, RenderTree};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)\s*\}\}")
        .expect("valid placeholder regex")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCompiler;

impl TemplateCompiler for PlaceholderCompiler {
    fn compile(&self, source: &str) -> Result<RenderFn, TemplateError> {
        let segments = parse(source)?;
        Ok(Arc::new(move |data: &RenderData| render(&segments, data)))
    }
}

enum Segment {
    Text(String),
    Key(Vec<String>),
}

fn parse(source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for captures in PLACEHOLDER_RE.captures_iter(source) {
        let (Some(whole), Some(key)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        push_text(&mut segments, &source[cursor..whole.start()])?;
        segments.push(Segment::Key(
            key.as_str().split('.').map(str::to_string).collect(),
        ));
        cursor = whole.end();
    }
    push_text(&mut segments, &source[cursor..])?;
    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str) -> Result<(), TemplateError> {
    if let Some(offset) = text.find("{{") {
        return Err(TemplateError::Compile {
            path: String::new(),
            message: format!("malformed placeholder near `{}`", excerpt(&text[offset..])),
        });
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
    Ok(())
}

fn excerpt(text: &str) -> String {
    text.chars().take(24).collect()
}

fn render(segments: &[Segment], data: &RenderData) -> Result<RenderTree, RenderError> {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Key(path) => out.push_str(&lookup(data, path)?),
        }
    }
    Ok(RenderTree::new(out))
}

fn lookup(data: &RenderData, path: &[String]) -> Result<String, RenderError> {
    let missing = || RenderError::new(format!("missing template value `{}`", path.join(".")));
    let (first, rest) = path.split_first().ok_or_else(missing)?;
    let mut value = data.get(first).ok_or_else(missing)?;
    for key in rest {
        value = value.get(key).ok_or_else(missing)?;
    }
    Ok(match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}
