//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::args::{OutputFormat, SearchGateArgs};
use crate::error::Result;
use crate::rebuild::{BackendOutcome, BackendReport, IndexReport};

/// Result structure for schema checks.
#[derive(Debug, Serialize, Deserialize)]
pub struct CheckResult {
    pub types: usize,
    pub indexed_types: usize,
    pub problems: Vec<String>,
}

/// Rebuild outcome of one backend.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackendSummary {
    pub backend: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BackendOutcome> for BackendSummary {
    fn from(outcome: &BackendOutcome) -> Self {
        match &outcome.result {
            Ok(BackendReport::NotRequired { backend }) => BackendSummary {
                backend: backend.clone(),
                status: "not_required".to_string(),
                indexes: Vec::new(),
                error: None,
            },
            Ok(BackendReport::Rebuilt { backend, indexes }) => BackendSummary {
                backend: backend.clone(),
                status: "rebuilt".to_string(),
                indexes: indexes.clone(),
                error: None,
            },
            Err(e) => BackendSummary {
                backend: outcome.backend.clone(),
                status: "failed".to_string(),
                indexes: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }
}

/// Result structure for rebuilds.
#[derive(Debug, Serialize, Deserialize)]
pub struct RebuildResult {
    pub backends: Vec<BackendSummary>,
}

impl RebuildResult {
    pub fn failed(&self) -> usize {
        self.backends.iter().filter(|b| b.error.is_some()).count()
    }
}

/// Print a JSON document. Human output is always indented.
pub fn output_json_document(value: &Value, args: &SearchGateArgs) -> Result<()> {
    let text = if args.pretty || args.output_format == OutputFormat::Human {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

pub fn output_check(result: &CheckResult, args: &SearchGateArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(result, args),
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!(
                    "Checked {} types ({} indexed)",
                    result.types, result.indexed_types
                );
            }
            if result.problems.is_empty() {
                if args.verbosity() > 0 {
                    println!("No problems found");
                }
            } else {
                println!("Problems:");
                println!("─────────");
                for problem in &result.problems {
                    println!("  {problem}");
                }
            }
            Ok(())
        }
    }
}

pub fn output_rebuild(result: &RebuildResult, args: &SearchGateArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Json => output_json(result, args),
        OutputFormat::Human => {
            for backend in &result.backends {
                match backend.status.as_str() {
                    "not_required" => {
                        println!("{}: no rebuild required", backend.backend);
                    }
                    "failed" => {
                        println!(
                            "{}: FAILED: {}",
                            backend.backend,
                            backend.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    _ => {
                        println!("{}: rebuilt", backend.backend);
                        for index in &backend.indexes {
                            println!("  {} ({} objects)", index.index, index.objects());
                            if args.verbosity() > 1 {
                                for report in &index.types {
                                    println!("    {}: {}", report.type_id, report.objects);
                                }
                            }
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

fn output_json<T: Serialize>(result: &T, args: &SearchGateArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchGateError;
    use crate::rebuild::TypeReport;

    #[test]
    fn test_backend_summaries() {
        let rebuilt = BackendOutcome {
            backend: "es".to_string(),
            result: Ok(BackendReport::Rebuilt {
                backend: "es".to_string(),
                indexes: vec![IndexReport {
                    index: "searchtests_book".to_string(),
                    types: vec![TypeReport {
                        type_id: "searchtests.Book".to_string(),
                        objects: 14,
                    }],
                }],
            }),
        };
        let failed = BackendOutcome {
            backend: "broken".to_string(),
            result: Err(SearchGateError::transient("connection refused")),
        };

        let result = RebuildResult {
            backends: vec![BackendSummary::from(&rebuilt), BackendSummary::from(&failed)],
        };
        assert_eq!(result.failed(), 1);
        assert_eq!(result.backends[0].indexes[0].objects(), 14);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["backends"][0]["status"], "rebuilt");
        assert_eq!(
            json["backends"][1]["error"],
            "Transient backend error: connection refused"
        );
    }
}
