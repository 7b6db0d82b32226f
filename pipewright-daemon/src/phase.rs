//! Fixed step composition of each phase.
//!
//! | Phase       | Steps                                               |
//! |-------------|-----------------------------------------------------|
//! | Conception  | `contract_generator` / `generate` (ERC721 scaffold) |
//! | Development | gates Requirements, Architecture                    |
//! | Validation  | gates Security, CodeQuality                         |
//! | Deployment  | `deployment_manager` / `prepare` on sepolia         |
//! | Monitoring  | none                                                |

use pipewright_core::{Gate, Phase};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Dispatch {
        agent: &'static str,
        task: &'static str,
        args: Value,
    },
    Gate(Gate),
}

pub fn steps(phase: Phase) -> Vec<Step> {
    match phase {
        Phase::Conception => vec![Step::Dispatch {
            agent: "contract_generator",
            task: "generate",
            args: json!({
                "requirements": "NFT marketplace with core listing and purchase features",
                "type": "erc721",
            }),
        }],
        Phase::Development => vec![Step::Gate(Gate::Requirements), Step::Gate(Gate::Architecture)],
        Phase::Validation => vec![Step::Gate(Gate::Security), Step::Gate(Gate::CodeQuality)],
        Phase::Deployment => vec![Step::Dispatch {
            agent: "deployment_manager",
            task: "prepare",
            args: json!({ "network": "sepolia", "contract_name": "SimpleNFT" }),
        }],
        Phase::Monitoring => vec![],
    }
}
