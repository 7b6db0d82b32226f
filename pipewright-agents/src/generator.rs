//! Content generation boundary and the built-in tera template generator.
//!
//! # Template resolution
//!
//! | Contract type | Template             |
//! |---------------|----------------------|
//! | `erc20`       | `erc20.sol.tera`     |
//! | `erc721`      | `erc721.sol.tera`    |
//! | `erc1155`     | `erc1155.sol.tera`   |
//! | `custom`      | `custom.sol.tera`    |
//!
//! Embedded templates can be overridden per project by dropping a file with
//! the same name into `<project>/templates/contracts/`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tera::{Context, Tera};

use crate::error::GenerationError;

pub const SOLIDITY_VERSION: &str = "0.8.20";

const TPLS: &[(&str, &str)] = &[
    ("erc20.sol.tera", include_str!("templates/erc20.sol.tera")),
    ("erc721.sol.tera", include_str!("templates/erc721.sol.tera")),
    ("erc1155.sol.tera", include_str!("templates/erc1155.sol.tera")),
    ("custom.sol.tera", include_str!("templates/custom.sol.tera")),
];

// ---------------------------------------------------------------------------
// ContractType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Erc20,
    Erc721,
    Erc1155,
    #[default]
    Custom,
}

impl ContractType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractType::Erc20 => "erc20",
            ContractType::Erc721 => "erc721",
            ContractType::Erc1155 => "erc1155",
            ContractType::Custom => "custom",
        }
    }

    pub fn template_name(&self) -> String {
        format!("{}.sol.tera", self.as_str())
    }
}

impl fmt::Display for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "erc20" => Ok(ContractType::Erc20),
            "erc721" => Ok(ContractType::Erc721),
            "erc1155" => Ok(ContractType::Erc1155),
            "custom" => Ok(ContractType::Custom),
            other => Err(format!(
                "unknown contract type '{other}'; expected one of: erc20, erc721, erc1155, custom"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator boundary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub requirements: String,
    pub contract_type: ContractType,
    pub contract_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub text: String,
    pub metadata: Map<String, Value>,
}

/// Turns a natural-language requirement into contract source.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    fn provider(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError>;
}

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> GenerationError {
    GenerationError::Io {
        path: path.into(),
        source,
    }
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, GenerationError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut templates = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_lowercase()) else {
            continue;
        };
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, GenerationError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert((*name).to_string(), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    // Output is Solidity, not HTML.
    tera.autoescape_on(vec![]);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

// ---------------------------------------------------------------------------
// TemplateGenerator
// ---------------------------------------------------------------------------

/// Offline generator that renders an embedded scaffold per contract type.
pub struct TemplateGenerator {
    tera: Tera,
}

impl TemplateGenerator {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, GenerationError> {
        Ok(Self {
            tera: build_tera(user_template_dir)?,
        })
    }

    fn context(request: &GenerationRequest) -> Context {
        let lowered = request.requirements.to_lowercase();
        let mut ctx = Context::new();
        ctx.insert("contract_name", &request.contract_name);
        ctx.insert("symbol", &symbol_for(&request.contract_name));
        ctx.insert("requirements", request.requirements.trim());
        ctx.insert("solidity_version", SOLIDITY_VERSION);
        // Scaffolds mint by default; burning is opt-in.
        ctx.insert("mintable", &!lowered.contains("fixed supply"));
        ctx.insert("burnable", &lowered.contains("burn"));
        ctx
    }
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    fn provider(&self) -> &str {
        "template"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedContent, GenerationError> {
        let template = request.contract_type.template_name();
        let text = self.tera.render(&template, &Self::context(request))?;

        let metadata = json!({
            "template": template,
            "solidity_version": SOLIDITY_VERSION,
        });
        let metadata = match metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Ok(GeneratedContent { text, metadata })
    }
}

// ---------------------------------------------------------------------------
// Naming helpers
// ---------------------------------------------------------------------------

/// PascalCase identifier from the first three words of `requirements`.
pub fn contract_name_for(requirements: &str, contract_type: ContractType) -> String {
    let name: String = requirements
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(3)
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_ascii_uppercase()
                    .to_string()
                    + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect();

    match name.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => name,
        Some(_) => format!("C{name}"),
        None => format!("Generated{}", contract_type.as_str().to_ascii_uppercase()),
    }
}

fn symbol_for(contract_name: &str) -> String {
    let symbol: String = contract_name
        .chars()
        .filter(|c| c.is_ascii_uppercase())
        .take(4)
        .collect();
    if symbol.is_empty() {
        "TKN".to_string()
    } else {
        symbol
    }
}
