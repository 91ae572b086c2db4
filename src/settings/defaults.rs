pub(super) const MIN_PERIOD_MS: u64 = 1;
pub(super) const MAX_RENDER_FPS: u32 = 240;

pub(super) fn default_confidence_threshold() -> f32 {
    0.5
}

pub(super) fn default_k() -> usize {
    3
}

pub(super) fn default_noise_floor() -> f32 {
    0.01
}

pub(super) fn default_background_period_ms() -> u64 {
    100
}

pub(super) fn default_render_fps() -> u32 {
    60
}

pub(super) fn default_database_file() -> String {
    "livelabel.db".to_string()
}

pub(super) fn default_dataset_key() -> String {
    "knn_dataset_v1".to_string()
}

pub(super) fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

pub(super) fn clamp_noise_floor(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 0.99)
    } else {
        default_noise_floor()
    }
}
