//! SDXL text-to-image workflow in ComfyUI's API (prompt) format.

use serde_json::{json, Value};

use crate::synthesizer::SynthesisRequest;

/// Latent dimensions must be multiples of this.
pub const DIMENSION_ALIGNMENT: u32 = 64;

/// Prefix for files written by the `SaveImage` node.
pub const OUTPUT_PREFIX: &str = "covergen";

const SAMPLER: &str = "euler";
const SCHEDULER: &str = "normal";

/// Round `value` down to a multiple of [`DIMENSION_ALIGNMENT`], at least one step.
pub fn aligned_dimension(value: u32) -> u32 {
    (value / DIMENSION_ALIGNMENT).max(1) * DIMENSION_ALIGNMENT
}

/// Build the node graph for one synthesis.
///
/// Node ids follow ComfyUI's default txt2img graph. When a style binding is
/// present a `LoraLoader` (node `10`) is inserted between the checkpoint
/// and both the sampler and the text encoders.
pub fn build_txt2img(request: &SynthesisRequest, checkpoint: &str) -> Value {
    let mut graph = json!({
        "4": {
            "class_type": "CheckpointLoaderSimple",
            "inputs": {"ckpt_name": checkpoint}
        },
        "5": {
            "class_type": "EmptyLatentImage",
            "inputs": {
                "width": aligned_dimension(request.width),
                "height": aligned_dimension(request.height),
                "batch_size": 1
            }
        },
        "8": {
            "class_type": "VAEDecode",
            "inputs": {"samples": ["3", 0], "vae": ["4", 2]}
        },
        "9": {
            "class_type": "SaveImage",
            "inputs": {"filename_prefix": OUTPUT_PREFIX, "images": ["8", 0]}
        }
    });

    let (model_source, clip_source) = match &request.style_binding {
        Some(binding) => {
            graph["10"] = json!({
                "class_type": "LoraLoader",
                "inputs": {
                    "model": ["4", 0],
                    "clip": ["4", 1],
                    "lora_name": lora_file_name(&binding.name),
                    "strength_model": binding.weight,
                    "strength_clip": binding.weight
                }
            });
            (json!(["10", 0]), json!(["10", 1]))
        }
        None => (json!(["4", 0]), json!(["4", 1])),
    };

    graph["6"] = json!({
        "class_type": "CLIPTextEncode",
        "inputs": {"text": request.prompt, "clip": clip_source}
    });
    graph["7"] = json!({
        "class_type": "CLIPTextEncode",
        "inputs": {"text": request.negative_prompt, "clip": clip_source}
    });
    graph["3"] = json!({
        "class_type": "KSampler",
        "inputs": {
            "seed": request.seed,
            "steps": request.steps,
            "cfg": request.guidance,
            "sampler_name": SAMPLER,
            "scheduler": SCHEDULER,
            "denoise": 1.0,
            "model": model_source,
            "positive": ["6", 0],
            "negative": ["7", 0],
            "latent_image": ["5", 0]
        }
    });

    graph
}

fn lora_file_name(name: &str) -> String {
    if name.ends_with(".safetensors") {
        name.to_string()
    } else {
        format!("{name}.safetensors")
    }
}
