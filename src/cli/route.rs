//! CLI route: single route table and run context. Dispatches to the runtime and presentation.

use crate::bootstrap::{build_runtime, Runtime};
use crate::circuit::SwitchPosition;
use crate::cli::parse::{CircuitCommands, Commands, SwitchArg};
use crate::cli::presentation::*;
use crate::config::{BoardConfig, ConfigLoader};
use crate::display::{self, OutputValidator};
use crate::error::PipelineError;
use crate::generator::TriggerEvent;
use crate::orchestrator::{ClockFrame, CycleRequest, FrameDecorator};
use crate::scheduler::Scheduler;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

/// Runtime context for CLI execution: workspace and loaded configuration.
/// The orchestrator is assembled lazily; `preview` and `validate` never touch providers.
pub struct RunContext {
    workspace_root: PathBuf,
    config: BoardConfig,
}

impl RunContext {
    /// Create run context from workspace root and optional config path.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        Ok(Self {
            workspace_root,
            config,
        })
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    fn runtime(&self) -> Result<Runtime, PipelineError> {
        build_runtime(&self.config, &self.workspace_root)
    }

    pub async fn execute(&self, command: &Commands) -> Result<String, PipelineError> {
        match command {
            Commands::Run => self.handle_run().await,
            Commands::Send {
                generator,
                trigger,
                payload,
            } => {
                self.handle_send(generator.as_deref(), trigger.as_deref(), payload.as_deref())
                    .await
            }
            Commands::Preview {
                text,
                no_frame,
                format,
            } => self.handle_preview(text, *no_frame, format).await,
            Commands::Circuits { command } => self.handle_circuits(command),
            Commands::Probe { provider } => {
                let runtime = self.runtime()?;
                match provider {
                    Some(name) => {
                        let check = runtime.orchestrator.probe_provider(name).await?;
                        Ok(format_probe_result(name, &check))
                    }
                    None => {
                        let checks = runtime.orchestrator.probe_all().await;
                        Ok(checks
                            .iter()
                            .map(|(name, check)| format_probe_result(name, check))
                            .collect::<Vec<_>>()
                            .join("\n"))
                    }
                }
            }
            Commands::History { limit, format } => self.handle_history(*limit, format),
            Commands::Validate => Ok(format_config_validation(&self.config.validate())),
        }
    }

    async fn handle_run(&self) -> Result<String, PipelineError> {
        let runtime = self.runtime()?;
        let (scheduler, handle) =
            Scheduler::new(runtime.orchestrator, self.config.schedule.clone());
        let task = tokio::spawn(scheduler.run());

        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, stopping scheduler"),
            Err(e) => warn!(error = %e, "Failed to listen for interrupt; stopping scheduler"),
        }
        handle.shutdown();
        if let Err(e) = task.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
        Ok("Scheduler stopped".to_string())
    }

    async fn handle_send(
        &self,
        generator: Option<&str>,
        trigger: Option<&str>,
        payload: Option<&str>,
    ) -> Result<String, PipelineError> {
        let mut request = CycleRequest::major(Utc::now());
        if let Some(generator_id) = generator {
            request = request.with_generator(generator_id);
        }
        if let Some(event_type) = trigger {
            let payload = match payload {
                Some(raw) => serde_json::from_str(raw).map_err(|e| {
                    PipelineError::Config(format!("Invalid --payload JSON: {}", e))
                })?,
                None => serde_json::Value::Null,
            };
            request = request.with_trigger(TriggerEvent::new(event_type, payload));
        }

        let runtime = self.runtime()?;
        let outcome = runtime.orchestrator.generate_and_send(request).await?;
        Ok(format_cycle_outcome(&outcome))
    }

    async fn handle_preview(
        &self,
        text: &str,
        no_frame: bool,
        format: &str,
    ) -> Result<String, PipelineError> {
        let text = text.replace("\\n", "\n");
        let validation = match OutputValidator::new().validate_text(&text) {
            Ok(validation) => validation,
            Err(e) => return Ok(format_validation_error(&e)),
        };

        let (layout, warnings) = if no_frame {
            (display::encode(&validation.lines())?, Vec::new())
        } else {
            let framed = ClockFrame::new(self.config.frame.clone())
                .decorate(&validation.normalized_text, Utc::now())
                .await?;
            (framed.layout, framed.warnings)
        };

        Ok(match format {
            "json" => format_preview_json(&validation, &layout, &warnings),
            _ => format_preview_text(&validation, &layout, &warnings),
        })
    }

    fn handle_circuits(&self, command: &CircuitCommands) -> Result<String, PipelineError> {
        let runtime = self.runtime()?;
        let orchestrator = &runtime.orchestrator;
        match command {
            CircuitCommands::List { format } => {
                let records = orchestrator.list_circuits()?;
                Ok(match format.as_str() {
                    "json" => format_circuits_json(&records),
                    _ => format_circuits_text(&records),
                })
            }
            CircuitCommands::Reset { circuit_id } => {
                let record = orchestrator.reset_circuit(circuit_id)?;
                Ok(format_circuit_change(&record))
            }
            CircuitCommands::Set {
                circuit_id,
                position,
            } => {
                let position = match position {
                    SwitchArg::On => SwitchPosition::On,
                    SwitchArg::Off => SwitchPosition::Off,
                };
                let record = orchestrator.set_manual_circuit(circuit_id, position)?;
                Ok(format_circuit_change(&record))
            }
        }
    }

    fn handle_history(&self, limit: usize, format: &str) -> Result<String, PipelineError> {
        let runtime = self.runtime()?;
        let Some(log) = runtime.attempt_log else {
            return Ok(
                "Attempt recording is disabled (storage.record_attempts = false)".to_string(),
            );
        };
        let records = log.recent(limit)?;
        Ok(match format {
            "json" => format_history_json(&records),
            _ => format_history_text(&records),
        })
    }
}
