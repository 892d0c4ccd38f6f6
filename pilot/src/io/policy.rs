//! Decision policy adapter.
//!
//! The [`Policy`] trait decouples the step controller from the reasoning
//! backend. [`CommandPolicy`] spawns an external policy command per decision:
//! a JSON request on stdin, a JSON prediction on stdout. Tests use scripted
//! policies that return predetermined predictions.

use anyhow::{Context, Result, anyhow, bail};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jsonschema::{Draft, Validator};
use minijinja::context;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::{Observation, Platform, Prediction};
use crate::io::config::PolicyConfig;
use crate::io::process::run_command;
use crate::io::template::{command_from_argv, render_argv};

const PREDICTION_SCHEMA: &str = include_str!("../../schemas/prediction.schema.json");

/// Abstraction over decision policies.
pub trait Policy {
    /// Propose the next action for `instruction` given the current observation.
    fn predict(&mut self, instruction: &str, observation: &Observation) -> Result<Prediction>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instruction: &'a str,
    platform: Platform,
    observation: ObservationPayload,
}

#[derive(Debug, Serialize)]
struct ObservationPayload {
    /// Base64 PNG.
    screenshot: String,
}

/// Policy that shells out to a configured command.
pub struct CommandPolicy {
    argv: Vec<String>,
    platform: Platform,
    output_limit_bytes: usize,
    validator: Validator,
}

impl CommandPolicy {
    /// Render the command template once for the session's platform.
    pub fn new(config: &PolicyConfig, platform: Platform) -> Result<Self> {
        let argv = render_argv(
            &config.command,
            &context! {
                platform => platform.as_str(),
                model => &config.model,
                model_type => &config.model_type,
                grounding_model => &config.grounding_model,
                grounding_type => &config.grounding_type,
            },
        )
        .context("render policy command")?;
        let schema: Value =
            serde_json::from_str(PREDICTION_SCHEMA).context("parse prediction schema")?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .context("compile prediction schema")?;
        debug!(?argv, %platform, "policy command ready");
        Ok(Self {
            argv,
            platform,
            output_limit_bytes: config.output_limit_bytes,
            validator,
        })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn parse_prediction(&self, stdout: &str) -> Result<Prediction> {
        let value = parse_json_payload(stdout)?;
        let messages: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !messages.is_empty() {
            bail!(
                "policy output failed schema validation:\n- {}",
                messages.join("\n- ")
            );
        }
        serde_json::from_value(value).context("decode policy prediction")
    }
}

impl Policy for CommandPolicy {
    #[instrument(skip_all, fields(instruction_len = instruction.len()))]
    fn predict(&mut self, instruction: &str, observation: &Observation) -> Result<Prediction> {
        let request = PredictRequest {
            instruction,
            platform: self.platform,
            observation: ObservationPayload {
                screenshot: STANDARD.encode(&observation.screenshot),
            },
        };
        let mut payload = serde_json::to_vec(&request).context("serialize policy request")?;
        payload.push(b'\n');

        let cmd = command_from_argv(&self.argv)?;
        let output = run_command(cmd, Some(&payload), self.output_limit_bytes)
            .context("run policy command")?;
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "policy command failed");
            return Err(anyhow!(
                "policy command failed with status {:?}: {}",
                output.status.code(),
                output.stderr_summary().unwrap_or_default()
            ));
        }
        let prediction = self.parse_prediction(&output.stdout_text())?;
        debug!(decision = ?prediction.decision(), "policy prediction");
        Ok(prediction)
    }
}

/// Parse the whole output as JSON, falling back to its last non-empty line so
/// chatty policies that log to stdout still work.
fn parse_json_payload(stdout: &str) -> Result<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        bail!("policy command produced no output");
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }
    let last = trimmed
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or(trimmed);
    serde_json::from_str(last).context("parse policy output as json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Decision;

    #[test]
    fn parse_json_payload_accepts_trailing_json_line() {
        let value = parse_json_payload("loading model...\n{\"action\": []}\n").expect("parse");
        assert_eq!(value["action"], serde_json::json!([]));
        assert!(parse_json_payload("   ").is_err());
        assert!(parse_json_payload("not json").is_err());
    }

    #[test]
    fn command_template_is_rendered_once_with_platform_and_models() {
        let config = PolicyConfig::default();
        let policy = CommandPolicy::new(&config, Platform::Darwin).expect("policy");
        let argv = policy.argv();
        assert_eq!(argv[0], "agent-s-bridge");
        assert!(argv.windows(2).any(|w| w == ["--platform", "darwin"]));
        assert!(argv.windows(2).any(|w| w == ["--model", "gpt-4o"]));
    }

    #[test]
    fn schema_rejects_non_list_action() {
        let policy = CommandPolicy::new(&PolicyConfig::default(), Platform::Linux).expect("policy");
        let err = policy
            .parse_prediction(r#"{"action": "click"}"#)
            .expect_err("should fail");
        assert!(err.to_string().contains("schema validation"));
    }

    #[cfg(unix)]
    fn shell_policy(script: &str) -> CommandPolicy {
        let config = PolicyConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..PolicyConfig::default()
        };
        CommandPolicy::new(&config, Platform::Linux).expect("policy")
    }

    #[cfg(unix)]
    #[test]
    fn predict_sends_request_and_parses_response() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request_path = temp.path().join("request.json");
        let script = format!(
            "cat > '{}'; echo '{{\"info\": \"type a guess\", \"action\": [\"pyautogui.write(1)\"]}}'",
            request_path.display()
        );
        let mut policy = shell_policy(&script);
        let observation = Observation {
            screenshot: b"png".to_vec(),
        };

        let prediction = policy.predict("play wordle", &observation).expect("predict");
        assert_eq!(prediction.info(), Some("type a guess"));
        assert_eq!(
            prediction.decision(),
            Decision::Act("pyautogui.write(1)".to_string())
        );

        let request: Value =
            serde_json::from_str(&std::fs::read_to_string(&request_path).expect("read request"))
                .expect("parse request");
        assert_eq!(request["instruction"], "play wordle");
        assert_eq!(request["platform"], "linux");
        assert_eq!(request["observation"]["screenshot"], STANDARD.encode(b"png"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_policy_command_is_an_error() {
        let mut policy = shell_policy("cat > /dev/null; echo 'quota exceeded' >&2; exit 2");
        let observation = Observation {
            screenshot: Vec::new(),
        };
        let err = policy.predict("task", &observation).expect_err("should fail");
        assert!(err.to_string().contains("quota exceeded"));
    }
}
