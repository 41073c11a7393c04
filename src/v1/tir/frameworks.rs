//! Inference framework tables.
//!
//! Framework keys (`VLLM`, `TRITON`, ...) map to the display name the API
//! expects and to the container image serving them. Frameworks that ship a
//! versioned server are keyed by server version, the rest by whether a model
//! repository was attached (`MODEL_SELECTED` / `MODEL_NOT_SELECTED`).

use std::collections::HashMap;

use lazy_static::lazy_static;
use thiserror::Error;

pub const MODEL_SELECTED: &str = "MODEL_SELECTED";
pub const MODEL_NOT_SELECTED: &str = "MODEL_NOT_SELECTED";

/// Frameworks that take the Hugging Face id from the user as-is.
const USER_MODEL_FRAMEWORKS: [&str; 3] = ["VLLM", "DYNAMO", "SGLANG"];

const VLLM_V061: &str = "vllm/vllm-openai:v0.6.1";
const VLLM_V062: &str = "vllm/vllm-openai:v0.6.2";
const VLLM_LATEST: &str = "vllm/vllm-openai:latest";
const TEXT_EMBEDDINGS: &str = "ghcr.io/huggingface/text-embeddings-inference:1.5";
const GEMMA_TRT: &str = "registry.e2enetworks.net/aimle2e/triton_trt_llm:gemma-v1";

fn same_image(image: &'static str) -> Vec<(&'static str, &'static str)> {
    vec![(MODEL_SELECTED, image), (MODEL_NOT_SELECTED, image)]
}

lazy_static! {
    static ref FRAMEWORK_NAMES: HashMap<&'static str, &'static str> = HashMap::from([
        ("TRITON", "triton"),
        ("PYTORCH", "pytorch"),
        ("LLAMA", "llma"),
        ("CODELAMA", "codellama"),
        ("STABLE_DIFFUSION", "stable_diffusion"),
        ("STABLE_DIFFUSION_XL", "stable_diffusion_xl"),
        ("MPT", "mpt"),
        ("CUSTOM", "custom"),
        ("MIXTRAL8X7B", "mixtral-8x7b-instruct"),
        ("MIXTRAL7B", "mistral-7b-instruct"),
        ("TENSOR_RT", "tensorrt"),
        ("FINETUNED", "finetuned"),
        ("GEMMA_2B", "gemma-2b"),
        ("GEMMA_2B_IT", "gemma-2b-it"),
        ("GEMMA_7B", "gemma-7b"),
        ("GEMMA_7B_IT", "gemma-7b-it"),
        ("LLAMA_3", "llama-3-8b-instruct"),
        ("LLAMA_3_1", "llama-3_1-8b-instruct"),
        ("LLAMA_3_2", "llama-3_2-3b-instruct"),
        ("LLAMA_3_2_VISION", "llama-3_2-11b-vision-instruct"),
        ("VLLM", "vllm"),
        ("STARCODER", "starcoder2-7b"),
        ("PHI_3_MINI", "Phi-3-mini-128k-instruct"),
        ("NEMO", "nemo-rag"),
        ("STABLE_VIDEO_DIFFUSION", "stable-video-diffusion-img2vid-xt"),
        ("YOLO_V8", "yolov8"),
        ("NEMOTRON", "nemotron-3-8b-chat-4k-rlhf"),
        ("NV_EMBED", "nvidia-nv-embed-v1"),
        ("BAAI_LARGE", "bge-large-en-v1_5"),
        ("BAAI_RERANKER", "bge-reranker-large"),
        ("PIXTRAL", "pixtral-12b-2409"),
    ]);

    static ref CONTAINER_NAMES: HashMap<&'static str, HashMap<&'static str, &'static str>> = {
        let tables: Vec<(&'static str, Vec<(&'static str, &'static str)>)> = vec![
            (
                "TRITON",
                vec![
                    ("v24.02", "aimle2e/tritonserver:24.02-py3-01"),
                    ("v24.01", "aimle2e/tritonserver:24.01-py3-01"),
                    ("v23.12", "aimle2e/tritonserver:23.12-py3-01"),
                    ("v23.11", "aimle2e/tritonserver:23.01-py3-01"),
                    ("v23.10", "aimle2e/tritonserver:23.10-py3-01"),
                ],
            ),
            (
                "PYTORCH",
                vec![
                    ("v0.9.0", "pytorch/torchserve:0.9.0"),
                    ("v0.8.2", "pytorch/torchserve:0.8.2"),
                    ("v0.8.1", "pytorch/torchserve:0.8.1"),
                ],
            ),
            ("LLAMA", same_image(VLLM_V061)),
            ("LLAMA_3", same_image(VLLM_V061)),
            ("LLAMA_3_1", same_image(VLLM_LATEST)),
            ("LLAMA_3_2", same_image(VLLM_V062)),
            ("LLAMA_3_2_VISION", same_image(VLLM_V062)),
            ("CODELAMA", same_image(VLLM_V061)),
            (
                "STABLE_DIFFUSION",
                vec![
                    (MODEL_SELECTED, "registry.e2enetworks.net/aimle2e/stable-diffusion-2-1:eos-v1"),
                    (MODEL_NOT_SELECTED, "registry.e2enetworks.net/aimle2e/stable-diffusion-2-1:hf-v1"),
                ],
            ),
            (
                "STABLE_DIFFUSION_XL",
                vec![
                    (MODEL_SELECTED, "registry.e2enetworks.net/aimle2e/stable-diffusion-xl-base-1.0:eos"),
                    (MODEL_NOT_SELECTED, "registry.e2enetworks.net/aimle2e/stable-diffusion-xl-base-1.0:hf"),
                ],
            ),
            ("MPT", same_image(VLLM_V061)),
            ("MIXTRAL8X7B", same_image(VLLM_V061)),
            ("MIXTRAL7B", same_image(VLLM_V061)),
            (
                "TENSOR_RT",
                vec![
                    ("v24.02", "aimle2e/tritonserver:24.02-trtllm-python-py3-01"),
                    ("v24.01", "aimle2e/tritonserver:24.01-trtllm-python-py3-01"),
                    ("v23.12", "aimle2e/tritonserver:23.12-trtllm-python-py3-01"),
                    ("v23.11", "aimle2e/tritonserver:23.11-trtllm-python-py3-01"),
                    ("v23.10", "aimle2e/tritonserver:23.10-trtllm-python-py3-01"),
                    ("v0.10.0", "aimle2e/triton_trt_llm:v0.10.0"),
                    ("v0.9.0", "aimle2e/triton_trt_llm:0.9.0"),
                    ("v0.7.2", "aimle2e/triton_trt_llm:0.7.2"),
                ],
            ),
            ("GEMMA_2B", vec![(MODEL_NOT_SELECTED, GEMMA_TRT)]),
            ("GEMMA_2B_IT", same_image(VLLM_V061)),
            ("GEMMA_7B", vec![(MODEL_NOT_SELECTED, GEMMA_TRT)]),
            ("GEMMA_7B_IT", same_image(VLLM_V061)),
            ("VLLM", same_image(VLLM_LATEST)),
            ("STARCODER", same_image(VLLM_V061)),
            ("PHI_3_MINI", same_image(VLLM_V061)),
            (
                "NEMO",
                vec![("v0.9.0", "registry.e2enetworks.net/aimle2e/nemo-rag:0.9.0")],
            ),
            (
                "STABLE_VIDEO_DIFFUSION",
                vec![
                    (MODEL_SELECTED, "aimle2e/stable-video-diffusion:v1_eos"),
                    (MODEL_NOT_SELECTED, "aimle2e/stable-video-diffusion:v1"),
                ],
            ),
            ("YOLO_V8", same_image("registry.e2enetworks.net/aimle2e/yolov8:v1")),
            ("NEMOTRON", same_image("aimle2e/nemotron:3-8b-chat-4k-rlhf")),
            (
                "NV_EMBED",
                vec![
                    (MODEL_SELECTED, "aimle2e/nv_embed_v1:v1_eos"),
                    (MODEL_NOT_SELECTED, "aimle2e/nv_embed_v1:v1"),
                ],
            ),
            ("BAAI_LARGE", same_image(TEXT_EMBEDDINGS)),
            ("BAAI_RERANKER", same_image(TEXT_EMBEDDINGS)),
            ("PIXTRAL", same_image("vllm/vllm-openai:v0.6.1.post2")),
        ];
        tables
            .into_iter()
            .map(|(framework, images)| (framework, images.into_iter().collect()))
            .collect()
    };

    static ref DEFAULT_HUGGING_FACE_IDS: HashMap<&'static str, &'static str> = HashMap::from([
        ("LLAMA", "meta-llama/Llama-2-7b-chat-hf"),
        ("LLAMA_3", "meta-llama/Meta-Llama-3-8B-Instruct"),
        ("LLAMA_3_1", "meta-llama/Meta-Llama-3.1-8B-Instruct"),
        ("LLAMA_3_2", "meta-llama/Llama-3.2-3B-Instruct"),
        ("LLAMA_3_2_VISION", "meta-llama/Llama-3.2-11B-Vision-Instruct"),
        ("CODELAMA", "codellama/CodeLlama-7b-Instruct-hf"),
        ("MPT", "mosaicml/mpt-7b-chat"),
        ("MIXTRAL8X7B", "mistralai/Mixtral-8x7B-Instruct-v0.1"),
        ("MIXTRAL7B", "mistralai/Mistral-7B-Instruct-v0.1"),
        ("GEMMA_2B", "google/gemma-2b"),
        ("GEMMA_2B_IT", "google/gemma-2b-it"),
        ("GEMMA_7B", "google/gemma-7b"),
        ("GEMMA_7B_IT", "google/gemma-7b-it"),
        ("STARCODER", "bigcode/starcoder2-7b"),
        ("PHI_3_MINI", "microsoft/Phi-3-mini-128k-instruct"),
        ("STABLE_DIFFUSION", "stabilityai/stable-diffusion-2-1"),
        ("STABLE_DIFFUSION_XL", "stabilityai/stable-diffusion-xl-base-1.0"),
        ("STABLE_VIDEO_DIFFUSION", "stabilityai/stable-video-diffusion-img2vid-xt"),
        ("NV_EMBED", "nvidia/NV-Embed-v1"),
        ("BAAI_LARGE", "BAAI/bge-large-en-v1.5"),
        ("BAAI_RERANKER", "BAAI/bge-reranker-large"),
        ("PIXTRAL", "mistralai/Pixtral-12B-2409"),
    ]);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameworkError {
    #[error("Unknown framework {0}")]
    UnknownFramework(String),
    #[error("Framework {framework} has no container for {variant}")]
    UnknownVariant { framework: String, variant: String },
}

/// Resolve the container image for a framework.
///
/// A non-empty `server_option` selects a versioned server directly, otherwise
/// the presence of `model_id` picks between the two model variants.
pub fn container_name(
    server_option: &str,
    model_id: &str,
    framework: &str,
) -> Result<&'static str, FrameworkError> {
    let images = CONTAINER_NAMES
        .get(framework)
        .ok_or_else(|| FrameworkError::UnknownFramework(framework.to_string()))?;
    let variant = match (server_option.trim(), model_id.is_empty()) {
        ("", false) => MODEL_SELECTED,
        ("", true) => MODEL_NOT_SELECTED,
        (server_option, _) => server_option,
    };
    images
        .get(variant)
        .copied()
        .ok_or_else(|| FrameworkError::UnknownVariant {
            framework: framework.to_string(),
            variant: variant.to_string(),
        })
}

pub fn framework_name(framework: &str) -> Result<&'static str, FrameworkError> {
    FRAMEWORK_NAMES
        .get(framework)
        .copied()
        .ok_or_else(|| FrameworkError::UnknownFramework(framework.to_string()))
}

/// Default upstream model for a framework, empty when none is known.
pub fn default_hugging_face_id(framework: &str) -> &'static str {
    DEFAULT_HUGGING_FACE_IDS
        .get(framework)
        .copied()
        .unwrap_or_default()
}

/// Whether the framework serves the Hugging Face model the user picked.
pub fn uses_user_model(framework: &str) -> bool {
    USER_MODEL_FRAMEWORKS.contains(&framework)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vllm_without_model_uses_model_not_selected() {
        assert_eq!(
            container_name("", "", "VLLM"),
            Ok(CONTAINER_NAMES["VLLM"][MODEL_NOT_SELECTED])
        );
    }

    #[test]
    fn model_id_selects_model_variant() {
        assert_eq!(
            container_name("", "42", "STABLE_DIFFUSION"),
            Ok("registry.e2enetworks.net/aimle2e/stable-diffusion-2-1:eos-v1")
        );
        assert_eq!(
            container_name("", "", "STABLE_DIFFUSION"),
            Ok("registry.e2enetworks.net/aimle2e/stable-diffusion-2-1:hf-v1")
        );
    }

    #[test]
    fn server_option_indexes_table() {
        assert_eq!(
            container_name("v24.01", "7", "TRITON"),
            Ok("aimle2e/tritonserver:24.01-py3-01")
        );
        assert_eq!(
            container_name("v0.9.0", "", "NEMO"),
            Ok("registry.e2enetworks.net/aimle2e/nemo-rag:0.9.0")
        );
    }

    #[test]
    fn unknown_framework_is_an_error() {
        assert_eq!(
            container_name("", "", "NOPE"),
            Err(FrameworkError::UnknownFramework("NOPE".into()))
        );
        assert!(framework_name("NOPE").is_err());
    }

    #[test]
    fn missing_variant_is_an_error() {
        assert!(matches!(
            container_name("", "1", "GEMMA_2B"),
            Err(FrameworkError::UnknownVariant { .. })
        ));
        assert!(matches!(
            container_name("v99", "", "TRITON"),
            Err(FrameworkError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn display_names() {
        assert_eq!(framework_name("LLAMA_3_1"), Ok("llama-3_1-8b-instruct"));
        assert_eq!(framework_name("VLLM"), Ok("vllm"));
    }

    #[test]
    fn default_ids() {
        assert_eq!(default_hugging_face_id("GEMMA_2B_IT"), "google/gemma-2b-it");
        assert_eq!(default_hugging_face_id("TRITON"), "");
        assert!(uses_user_model("SGLANG"));
        assert!(!uses_user_model("LLAMA_3"));
    }
}
