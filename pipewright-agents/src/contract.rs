//! `contract_generator`: scaffolds a Solidity contract from a requirement.
//!
//! Tasks:
//! - `generate {requirements, type|contract_type?, name?}`
//! - `analyze {code, type?}`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use pipewright_core::{layout, AgentSettings};
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use crate::analysis;
use crate::capability::{Capability, TaskContext, TaskOutput, CONTRACT_GENERATOR};
use crate::error::{io_err, CapabilityError, GenerationError};
use crate::generator::{
    contract_name_for, ContentGenerator, ContractType, GenerationRequest, TemplateGenerator,
};

const USER_TEMPLATE_DIR: &str = "templates/contracts";

const MAX_NAME_ATTEMPTS: u32 = 1_000;

pub struct ContractGenerator {
    generator: Box<dyn ContentGenerator>,
}

impl ContractGenerator {
    pub fn new(generator: Box<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    /// Generator selected by the agent's `provider` setting.
    ///
    /// Only the offline `template` provider is built in.
    pub fn for_project(root: &Path, settings: &AgentSettings) -> Result<Self, GenerationError> {
        match settings.setting_str("provider").unwrap_or("template") {
            "template" => {
                let dir = root.join(USER_TEMPLATE_DIR);
                Ok(Self::new(Box::new(TemplateGenerator::new(Some(&dir))?)))
            }
            other => Err(GenerationError::Provider(other.to_string())),
        }
    }

    async fn generate(&self, args: &Value, ctx: &TaskContext) -> Result<TaskOutput, CapabilityError> {
        let requirements = args
            .get("requirements")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CapabilityError::InvalidArgs("'requirements' is required".to_string()))?;
        let contract_type = parse_type(args)?;
        let contract_name = args
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| contract_name_for(requirements, contract_type));

        tracing::info!(contract_type = %contract_type, contract_name, "generating contract");
        let request = GenerationRequest {
            requirements: requirements.to_string(),
            contract_type,
            contract_name,
        };
        let content = self.generator.generate(&request).await?;
        let analysis = analysis::analyze(&content.text, contract_type.as_str());
        let status = if analysis.is_valid { "success" } else { "needs_review" };
        tracing::info!(summary = %analysis.summary, "contract generated");

        let mut payload = json!({
            "contract_type": contract_type,
            "contract_name": request.contract_name,
            "requirements": request.requirements,
            "provider": self.generator.provider(),
            "code": content.text,
            "analysis": analysis,
            "metadata": content.metadata,
            "file_name": file_name(contract_type),
            "status": status,
        });

        if ctx.settings.setting_bool("auto_save").unwrap_or(false) {
            let saved = save(&layout::generated_contracts_dir(&ctx.project_root), &mut payload).await?;
            payload["saved_to"] = json!(saved);
        }

        let strict = ctx.settings.setting_bool("validate_after_generate").unwrap_or(true);
        if strict && status != "success" {
            return Ok(TaskOutput {
                success: false,
                error: Some("generated contract needs review".to_string()),
                payload,
            });
        }
        Ok(TaskOutput::ok(payload))
    }

    fn analyze(&self, args: &Value) -> Result<TaskOutput, CapabilityError> {
        let code = args
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| CapabilityError::InvalidArgs("'code' is required".to_string()))?;
        let contract_type = parse_type(args)?;
        let analysis = analysis::analyze(code, contract_type.as_str());
        Ok(TaskOutput::ok(serde_json::to_value(analysis)?))
    }
}

#[async_trait]
impl Capability for ContractGenerator {
    async fn run(
        &self,
        task: &str,
        args: &Value,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, CapabilityError> {
        match task {
            "generate" => self.generate(args, ctx).await,
            "analyze" => self.analyze(args),
            other => Err(CapabilityError::UnsupportedTask {
                capability: CONTRACT_GENERATOR.to_string(),
                task: other.to_string(),
            }),
        }
    }
}

fn parse_type(args: &Value) -> Result<ContractType, CapabilityError> {
    match args
        .get("type")
        .or_else(|| args.get("contract_type"))
        .and_then(Value::as_str)
    {
        Some(raw) => raw.parse().map_err(CapabilityError::InvalidArgs),
        None => Ok(ContractType::default()),
    }
}

fn file_name(contract_type: ContractType) -> String {
    format!(
        "Generated_{}_{}.sol",
        contract_type,
        Local::now().format("%Y%m%d_%H%M%S")
    )
}

/// Write `payload.code` to `<dir>/<file_name>` and the rest of the payload
/// to a `.json` sibling. A name already taken gets a `_1`, `_2`, … suffix,
/// and `file_name` is updated to the name actually used. Returns the `.sol` path.
async fn save(dir: &Path, payload: &mut Value) -> Result<PathBuf, CapabilityError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| io_err(dir, e))?;

    let requested = payload["file_name"]
        .as_str()
        .unwrap_or("GeneratedContract.sol")
        .to_string();
    let code = payload["code"].as_str().unwrap_or_default().to_string();
    let (path, mut file) = claim(dir, &requested).await?;
    file.write_all(code.as_bytes())
        .await
        .map_err(|e| io_err(&path, e))?;
    file.flush().await.map_err(|e| io_err(&path, e))?;
    if let Some(name) = path.file_name() {
        payload["file_name"] = json!(name.to_string_lossy());
    }

    let mut metadata = payload.clone();
    if let Some(map) = metadata.as_object_mut() {
        map.remove("code");
    }
    let meta_path = path.with_extension("json");
    let bytes = serde_json::to_vec_pretty(&metadata)?;
    tokio::fs::write(&meta_path, bytes)
        .await
        .map_err(|e| io_err(&meta_path, e))?;

    tracing::info!(path = %path.display(), "contract saved");
    Ok(path)
}

async fn claim(dir: &Path, file_name: &str) -> Result<(PathBuf, tokio::fs::File), CapabilityError> {
    let stem = file_name.strip_suffix(".sol").unwrap_or(file_name);
    let mut attempt = 0u32;
    loop {
        let candidate = if attempt == 0 {
            dir.join(file_name)
        } else {
            dir.join(format!("{stem}_{attempt}.sol"))
        };
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                attempt += 1;
            }
            Err(err) => return Err(io_err(&candidate, err)),
        }
    }
}
