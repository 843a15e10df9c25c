//! Image folder loader
//!
//! Reads the `<split>/<class-name>/<image>` layout. Class indices follow the
//! sorted order of the class directory names, so the same folder always maps
//! to the same label.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::utils::{format_number, CropDiseaseError, Result};

/// File extensions accepted as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "ppm", "bmp", "pgm", "tif", "tiff", "webp",
];

/// Check whether a path has one of the accepted image extensions
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// One split of a labeled image folder
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the split
    pub root_dir: PathBuf,
    /// Class names, index = label
    pub classes: Vec<String>,
    /// All samples, grouped by class and sorted by path within a class
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Open a split, discovering its classes from the directory names
    ///
    /// ```text
    /// root_dir/
    /// ├── Tomato___Late_blight/
    /// │   ├── image1.jpg
    /// │   └── image2.jpg
    /// └── Tomato___healthy/
    ///     └── ...
    /// ```
    pub fn open<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        let classes = discover_classes(&root_dir)?;
        if classes.is_empty() {
            return Err(CropDiseaseError::Dataset(format!(
                "no class directories found in {:?}",
                root_dir
            )));
        }

        info!("Found {} classes in {:?}", classes.len(), root_dir);
        Self::build(root_dir, classes)
    }

    /// Open a split using a fixed class list (usually the training split's)
    ///
    /// Every class directory in the split must appear in `classes`, otherwise
    /// labels would not line up with the classifier outputs. Classes with no
    /// directory here simply contribute no samples.
    pub fn open_with_classes<P: AsRef<Path>>(root_dir: P, classes: &[String]) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        let found = discover_classes(&root_dir)?;

        let unknown: Vec<&String> = found.iter().filter(|c| !classes.contains(c)).collect();
        if !unknown.is_empty() {
            return Err(CropDiseaseError::Dataset(format!(
                "classes {:?} in {:?} are not present in the training split",
                unknown, root_dir
            )));
        }

        Self::build(root_dir, classes.to_vec())
    }

    fn build(root_dir: PathBuf, classes: Vec<String>) -> Result<Self> {
        let mut samples = Vec::new();

        for (label, class_name) in classes.iter().enumerate() {
            let class_dir = root_dir.join(class_name);
            if !class_dir.is_dir() {
                continue;
            }

            let before = samples.len();
            for entry in WalkDir::new(&class_dir)
                .min_depth(1)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && is_image_file(entry.path()) {
                    samples.push(ImageSample {
                        path: entry.path().to_path_buf(),
                        label,
                    });
                }
            }

            let count = samples.len() - before;
            if count == 0 {
                warn!("Class '{}' has no images in {:?}", class_name, root_dir);
            }
            debug!("Class '{}' (label {}): {} samples", class_name, label, count);
        }

        info!("Loaded {} samples from {:?}", samples.len(), root_dir);

        Ok(Self {
            root_dir,
            classes,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// (path, label) pairs for the burn dataset
    pub fn pairs(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    /// Get statistics about the split
    pub fn stats(&self) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_names: self.classes.clone(),
            class_counts,
        }
    }
}

/// Sorted names of the directories directly under `root_dir`
fn discover_classes(root_dir: &Path) -> Result<Vec<String>> {
    if !root_dir.is_dir() {
        return Err(CropDiseaseError::Dataset(format!(
            "dataset directory does not exist: {:?}",
            root_dir
        )));
    }

    let mut classes = Vec::new();
    for entry in std::fs::read_dir(root_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                classes.push(name.to_string());
            }
        }
    }
    classes.sort();

    Ok(classes)
}

/// Statistics about one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl DatasetStats {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Print statistics to console
    pub fn print(&self, title: &str) {
        println!("\n📊 {}:", title);
        println!("  Total samples: {}", format_number(self.total_samples));
        println!("  Number of classes: {}", self.num_classes());
        println!("\n  Samples per class:");

        for (idx, (name, count)) in self
            .class_names
            .iter()
            .zip(self.class_counts.iter())
            .enumerate()
        {
            let bar_len = if self.total_samples > 0 {
                (*count as f32 / self.total_samples as f32 * 40.0) as usize
            } else {
                0
            };
            let bar: String = "█".repeat(bar_len);
            println!("    {:3}. {:40} {:5} {}", idx, name, count, bar);
        }
    }
}
