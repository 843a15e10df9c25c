//! ImageNet backbone weights from a torchvision checkpoint
//!
//! `torchvision.models.efficientnet_b0` state dicts (`.pth`/`.pt`) are read
//! with burn-import's PyTorch recorder. Keys are renamed from the torchvision
//! layout to the module paths of [`EfficientNetB0`]:
//!
//! ```text
//! features.0.{0,1}.*                 -> stem.{conv,bn}.*
//! features.{s}.{m}.block.{k}.{0,1}.* -> blocks.{i}.{expand,depthwise,project}.{conv,bn}.*
//! features.{s}.{m}.block.{k}.fc{1,2}.* -> blocks.{i}.squeeze_excite.fc{1,2}.*
//! features.8.{0,1}.*                 -> head.{conv,bn}.*
//! ```
//!
//! BatchNorm `weight`/`bias` become `gamma`/`beta` inside the recorder. The
//! `classifier.*` and `num_batches_tracked` entries have no counterpart and
//! are dropped.

use std::path::Path;

use burn::{
    record::{FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use tracing::debug;

use super::efficientnet::{EfficientNetB0Record, B0_STAGES};
use crate::utils::CheckpointError;

/// Extensions treated as PyTorch checkpoints
pub const TORCH_EXTENSIONS: [&str; 2] = ["pth", "pt"];

/// `true` for `.pth` / `.pt` files
pub fn is_torch_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            TORCH_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Conv at `.0`, BatchNorm at `.1`
fn conv_norm_remaps(from: &str, to: &str) -> [(String, String); 2] {
    [
        (format!(r"^{}\.0\.(.+)$", from), format!("{}.conv.$1", to)),
        (format!(r"^{}\.1\.(.+)$", from), format!("{}.bn.$1", to)),
    ]
}

/// Regex key remaps from torchvision names to burn module paths
pub fn torchvision_key_remaps() -> Vec<(String, String)> {
    let mut remaps = Vec::new();
    remaps.extend(conv_norm_remaps(r"features\.0", "stem"));

    let mut index = 0;
    for (stage, spec) in B0_STAGES.iter().enumerate() {
        for layer in 0..spec.layers {
            let block = format!(r"features\.{}\.{}\.block", stage + 1, layer);
            let target = format!("blocks.{}", index);

            // Without expansion the block list starts at the depthwise conv
            let offset = if spec.expand_ratio != 1 {
                remaps.extend(conv_norm_remaps(
                    &format!(r"{}\.0", block),
                    &format!("{}.expand", target),
                ));
                1
            } else {
                0
            };

            remaps.extend(conv_norm_remaps(
                &format!(r"{}\.{}", block, offset),
                &format!("{}.depthwise", target),
            ));
            remaps.push((
                format!(r"^{}\.{}\.(.+)$", block, offset + 1),
                format!("{}.squeeze_excite.$1", target),
            ));
            remaps.extend(conv_norm_remaps(
                &format!(r"{}\.{}", block, offset + 2),
                &format!("{}.project", target),
            ));

            index += 1;
        }
    }

    remaps.extend(conv_norm_remaps(r"features\.8", "head"));
    remaps
}

/// Read an EfficientNet-B0 backbone record from a torchvision state dict
pub fn load_torchvision_backbone<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<EfficientNetB0Record<B>, CheckpointError> {
    let remaps = torchvision_key_remaps();
    debug!("Reading {:?} with {} key remaps", path, remaps.len());

    let args = remaps
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();
    Recorder::<B>::load(&recorder, args, device)
        .map_err(|e| CheckpointError::Incompatible(format!("torchvision weights {:?}: {}", path, e)))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use burn::module::Module;
    use burn::record::PrettyJsonFileRecorder;
    use regex::Regex;
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;
    use crate::backend::DefaultBackend;
    use crate::model::efficientnet::EfficientNetB0;

    type B = DefaultBackend;

    const CONV_NORM: [&str; 5] = [
        "0.weight",
        "1.weight",
        "1.bias",
        "1.running_mean",
        "1.running_var",
    ];

    fn conv_norm(prefix: String, keys: &mut Vec<String>) {
        for suffix in CONV_NORM {
            keys.push(format!("{}.{}", prefix, suffix));
        }
        keys.push(format!("{}.1.num_batches_tracked", prefix));
    }

    /// Parameter names of `torchvision.models.efficientnet_b0().state_dict()`
    fn torchvision_state_dict_keys() -> Vec<String> {
        let mut keys = Vec::new();

        conv_norm("features.0".to_string(), &mut keys);
        for (stage, spec) in B0_STAGES.iter().enumerate() {
            for layer in 0..spec.layers {
                let block = format!("features.{}.{}.block", stage + 1, layer);
                let mut k = 0;
                if spec.expand_ratio != 1 {
                    conv_norm(format!("{}.{}", block, k), &mut keys);
                    k += 1;
                }
                conv_norm(format!("{}.{}", block, k), &mut keys);
                for fc in ["fc1", "fc2"] {
                    keys.push(format!("{}.{}.{}.weight", block, k + 1, fc));
                    keys.push(format!("{}.{}.{}.bias", block, k + 1, fc));
                }
                conv_norm(format!("{}.{}", block, k + 2), &mut keys);
            }
        }
        conv_norm("features.8".to_string(), &mut keys);
        keys.push("classifier.1.weight".to_string());
        keys.push("classifier.1.bias".to_string());
        keys
    }

    /// Apply the remaps in order, as the PyTorch recorder does
    fn remap(key: &str, remaps: &[(Regex, String)]) -> String {
        let mut name = key.to_string();
        for (pattern, replacement) in remaps {
            if pattern.is_match(&name) {
                name = pattern.replace_all(&name, replacement.as_str()).to_string();
            }
        }
        name
    }

    fn collect_params(value: &Value, path: String, out: &mut BTreeSet<String>) {
        match value {
            Value::Object(map) if map.contains_key("id") && map.contains_key("param") => {
                out.insert(path);
            }
            Value::Object(map) => {
                for (name, child) in map {
                    collect_params(child, join(&path, name), out);
                }
            }
            Value::Array(items) => {
                for (i, child) in items.iter().enumerate() {
                    collect_params(child, join(&path, &i.to_string()), out);
                }
            }
            _ => {}
        }
    }

    fn join(path: &str, name: &str) -> String {
        if path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", path, name)
        }
    }

    /// Parameter paths of our backbone, read back from a JSON record
    fn backbone_param_paths() -> BTreeSet<String> {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let recorder = PrettyJsonFileRecorder::<FullPrecisionSettings>::new();
        EfficientNetB0::<B>::new(&device)
            .save_file(tmp.path().join("backbone"), &recorder)
            .unwrap();

        let text = std::fs::read_to_string(tmp.path().join("backbone.json")).unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        let mut paths = BTreeSet::new();
        collect_params(&json["item"], String::new(), &mut paths);
        paths
    }

    #[test]
    fn test_remaps_cover_every_backbone_parameter() {
        let remaps: Vec<(Regex, String)> = torchvision_key_remaps()
            .into_iter()
            .map(|(pattern, replacement)| (Regex::new(&pattern).unwrap(), replacement))
            .collect();

        let mapped: BTreeSet<String> = torchvision_state_dict_keys()
            .iter()
            .filter(|key| !key.starts_with("classifier.") && !key.ends_with("num_batches_tracked"))
            .map(|key| remap(key, &remaps))
            .map(|key| {
                // BatchNorm renames applied by the recorder
                if key.contains(".bn.") {
                    key.replace(".bn.weight", ".bn.gamma").replace(".bn.bias", ".bn.beta")
                } else {
                    key
                }
            })
            .collect();

        let expected = backbone_param_paths();
        let unmapped: Vec<_> = mapped.difference(&expected).collect();
        let missing: Vec<_> = expected.difference(&mapped).collect();
        assert!(unmapped.is_empty(), "keys without a module: {:?}", unmapped);
        assert!(missing.is_empty(), "parameters without a key: {:?}", missing);
        assert_eq!(expected.len(), mapped.len());
    }

    #[test]
    fn test_first_blocks_land_on_expected_paths() {
        let remaps: Vec<(Regex, String)> = torchvision_key_remaps()
            .into_iter()
            .map(|(pattern, replacement)| (Regex::new(&pattern).unwrap(), replacement))
            .collect();

        assert_eq!(remap("features.0.1.running_var", &remaps), "stem.bn.running_var");
        assert_eq!(
            remap("features.1.0.block.1.fc2.bias", &remaps),
            "blocks.0.squeeze_excite.fc2.bias"
        );
        assert_eq!(
            remap("features.1.0.block.2.0.weight", &remaps),
            "blocks.0.project.conv.weight"
        );
        assert_eq!(
            remap("features.2.1.block.1.0.weight", &remaps),
            "blocks.2.depthwise.conv.weight"
        );
        assert_eq!(
            remap("features.7.0.block.3.1.bias", &remaps),
            "blocks.15.project.bn.bias"
        );
        assert_eq!(remap("features.8.0.weight", &remaps), "head.conv.weight");
        assert_eq!(remap("classifier.1.weight", &remaps), "classifier.1.weight");
    }

    #[test]
    fn test_is_torch_file() {
        assert!(is_torch_file(Path::new("efficientnet_b0_rwightman-7f5810bc.pth")));
        assert!(is_torch_file(Path::new("weights/model.PT")));
        assert!(!is_torch_file(Path::new("backbone.mpk")));
        assert!(!is_torch_file(Path::new("pth")));
    }

    #[test]
    fn test_unreadable_torch_file_is_incompatible() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("weights.pth");
        std::fs::write(&path, b"not a pickle archive").unwrap();

        let device = Default::default();
        let result = load_torchvision_backbone::<B>(&path, &device);
        assert!(matches!(result, Err(CheckpointError::Incompatible(_))));
    }
}
