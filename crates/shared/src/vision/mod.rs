pub mod analyzer;
pub mod classifier;
pub mod image_prep;
pub mod report;

pub use analyzer::{AnalyzerError, FoodAnalyzer};
pub use classifier::{
    Classification, ClassifierError, ClassifierFuture, HuggingFaceZeroShotClassifier,
    ImageClassifier, LabelScore, ZeroShotConfig, select_best_label,
};
pub use image_prep::{
    DEFAULT_MAX_IMAGE_DIMENSION, ImagePrepError, PreparedImage, decode_data_url, prepare_image,
};
pub use report::{FoodReport, parse_food_report};

pub const FOOD_HEALTH_LABELS: [&str; 4] =
    ["Clearly Healthy", "Borderline", "Mixed", "Clearly Unhealthy"];
