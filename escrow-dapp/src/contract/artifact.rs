//! Compiled escrow contract artifact
//!
//! Reads the Hardhat artifact JSON (`abi` + `bytecode`) produced when the
//! Escrow contract is compiled, and checks that it exposes the entry points
//! the app calls.

use ethers::abi::Abi;
use ethers::types::{Address, Bytes};
use serde::Deserialize;
use std::path::Path;

use super::abi::encode_constructor_args;
use crate::error::{EscrowError, Result};

const REQUIRED_FUNCTIONS: &[&str] = &["approve", "setTimelock"];
const REQUIRED_EVENTS: &[&str] = &["Approved"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HardhatArtifact {
    contract_name: Option<String>,
    abi: Abi,
    bytecode: String,
}

/// Creation bytecode plus ABI of the escrow contract
#[derive(Debug, Clone)]
pub struct EscrowArtifact {
    pub contract_name: String,
    pub abi: Abi,
    bytecode: Bytes,
}

impl EscrowArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            EscrowError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact = Self::from_json(&raw)?;
        log::info!(
            "[Deployer] Loaded {} artifact from {} ({} bytes of bytecode)",
            artifact.contract_name,
            path.display(),
            artifact.bytecode.len()
        );
        Ok(artifact)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: HardhatArtifact = serde_json::from_str(raw)
            .map_err(|e| EscrowError::Artifact(format!("invalid artifact JSON: {}", e)))?;

        for name in REQUIRED_FUNCTIONS {
            if parsed.abi.function(name).is_err() {
                return Err(EscrowError::Artifact(format!("ABI has no function '{}'", name)));
            }
        }
        for name in REQUIRED_EVENTS {
            if parsed.abi.event(name).is_err() {
                return Err(EscrowError::Artifact(format!("ABI has no event '{}'", name)));
            }
        }

        let code_hex = parsed.bytecode.trim();
        let code_hex = code_hex.strip_prefix("0x").unwrap_or(code_hex);
        let bytecode = hex::decode(code_hex)
            .map_err(|e| EscrowError::Artifact(format!("invalid bytecode hex: {}", e)))?;
        if bytecode.is_empty() {
            return Err(EscrowError::Artifact(
                "bytecode is empty (abstract contract or interface?)".to_string(),
            ));
        }

        Ok(Self {
            contract_name: parsed.contract_name.unwrap_or_else(|| "Escrow".to_string()),
            abi: parsed.abi,
            bytecode: Bytes::from(bytecode),
        })
    }

    /// Creation bytecode followed by the encoded constructor arguments
    pub fn deploy_data(&self, arbiter: Address, beneficiary: Address) -> Bytes {
        let mut data = self.bytecode.to_vec();
        data.extend_from_slice(&encode_constructor_args(arbiter, beneficiary));
        Bytes::from(data)
    }
}
