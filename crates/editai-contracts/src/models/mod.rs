mod registry;
mod selectors;

pub use registry::{
    FieldRule, Inclusion, ModelRegistry, ModelSpec, UploadRule, ValueRule, MASK_UPLOAD,
    VARIATION_MAX_N, VARIATION_UPLOAD,
};
pub use selectors::{ModelSelection, ModelSelector};
