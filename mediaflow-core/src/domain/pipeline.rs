//! Pipeline and stage specifications

use serde::{Deserialize, Serialize};

/// Ordered list of stages one pipeline job executes
///
/// Each stage is backed by an independent remote processing service. The
/// primary artifact flows stage to stage; side artifacts are referenced by
/// the producing stage's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub stages: Vec<StageSpec>,
}

/// One step of a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    /// Stage name, unique within the pipeline. Side artifacts are addressed
    /// by this name.
    pub name: String,
    /// Base URL of the remote service executing this stage.
    pub service_url: String,
    /// Stage parameters forwarded verbatim to the remote service.
    #[serde(default)]
    pub params: serde_json::Value,
    /// How often to poll the remote task for status.
    pub poll_interval_secs: u64,
    /// How long to wait for the remote task before failing the stage.
    pub timeout_secs: u64,
    /// Which artifact this stage receives as input.
    pub input: StageInput,
}

/// Which artifact a stage consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageInput {
    /// The job's original source artifact
    Source,
    /// The output of the immediately preceding stage
    Previous,
    /// The output of the named earlier stage
    Stage(String),
}

/// Payload carried by pipeline jobs
///
/// When `stages` is absent the engine falls back to the stock localization
/// pipeline built from its configured services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelinePayload {
    /// Path of the source artifact to process.
    pub source: String,
    /// Parameters applied to every stage of the stock pipeline (target
    /// language, voice preset and the like).
    #[serde(default)]
    pub params: serde_json::Value,
    /// Explicit stage list overriding the stock pipeline.
    #[serde(default)]
    pub stages: Option<Vec<StageSpec>>,
}

/// Base URLs of the remote services backing the stock localization pipeline
#[derive(Debug, Clone)]
pub struct LocalizationServices {
    pub subtitle_removal: String,
    pub voice_extraction: String,
    pub speech_synthesis: String,
    pub lip_sync: String,
    pub subtitle_burn_in: String,
    pub resolution_enhancement: String,
}

impl PipelineSpec {
    /// The stock localization pipeline: strip burned-in subtitles, extract a
    /// voice profile from the clean video, synthesize translated speech with
    /// that profile, sync lips to the new speech, burn the translated
    /// subtitles back in and upscale the result.
    pub fn localization(services: &LocalizationServices, params: &serde_json::Value) -> Self {
        let stage = |name: &str, url: &str, poll: u64, timeout: u64, input: StageInput| StageSpec {
            name: name.to_string(),
            service_url: url.to_string(),
            params: params.clone(),
            poll_interval_secs: poll,
            timeout_secs: timeout,
            input,
        };
        Self {
            stages: vec![
                stage("subtitle-removal", &services.subtitle_removal, 3, 600, StageInput::Source),
                stage("voice-extraction", &services.voice_extraction, 2, 300, StageInput::Previous),
                stage(
                    "speech-synthesis",
                    &services.speech_synthesis,
                    2,
                    600,
                    StageInput::Stage("voice-extraction".to_string()),
                ),
                stage("lip-sync", &services.lip_sync, 5, 900, StageInput::Previous),
                stage("subtitle-burn-in", &services.subtitle_burn_in, 3, 300, StageInput::Previous),
                stage(
                    "resolution-enhancement",
                    &services.resolution_enhancement,
                    4,
                    900,
                    StageInput::Previous,
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> LocalizationServices {
        LocalizationServices {
            subtitle_removal: "http://localhost:9101".to_string(),
            voice_extraction: "http://localhost:9102".to_string(),
            speech_synthesis: "http://localhost:9103".to_string(),
            lip_sync: "http://localhost:9104".to_string(),
            subtitle_burn_in: "http://localhost:9105".to_string(),
            resolution_enhancement: "http://localhost:9106".to_string(),
        }
    }

    #[test]
    fn test_stock_pipeline_shape() {
        let spec = PipelineSpec::localization(&services(), &serde_json::json!({"lang": "es"}));
        assert_eq!(spec.stages.len(), 6);
        assert_eq!(spec.stages[0].input, StageInput::Source);
        assert_eq!(
            spec.stages[2].input,
            StageInput::Stage("voice-extraction".to_string())
        );
        for stage in &spec.stages {
            assert_eq!(stage.params, serde_json::json!({"lang": "es"}));
            assert!(stage.poll_interval_secs >= 2 && stage.poll_interval_secs <= 5);
        }
    }

    #[test]
    fn test_payload_defaults_to_stock_stages() {
        let payload: PipelinePayload =
            serde_json::from_value(serde_json::json!({"source": "/data/in.mp4"})).unwrap();
        assert!(payload.stages.is_none());
        assert_eq!(payload.params, serde_json::Value::Null);
    }

    #[test]
    fn test_stage_input_wire_format() {
        assert_eq!(serde_json::to_string(&StageInput::Source).unwrap(), "\"source\"");
        let named: StageInput = serde_json::from_str("{\"stage\":\"voice-extraction\"}").unwrap();
        assert_eq!(named, StageInput::Stage("voice-extraction".to_string()));
    }
}
